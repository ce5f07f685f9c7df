pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod feeds;
pub mod models;
pub mod monitoring;
pub mod stats;
pub mod utils;

#[cfg(test)]
mod test_support;
