mod types;

pub use types::{load_config, ColdStartPolicy, Config};
