pub mod convert;
pub mod format;

pub use convert::{lenient_f64, lenient_u64, strip_network_prefix};
pub use format::{escape_html, fmt_money, fmt_price, format_buy_message, short_addr, BuyMessage};
