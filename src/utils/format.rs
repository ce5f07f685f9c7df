use regex::Regex;
use std::sync::OnceLock;

/// Shorten an address for display, keeping `head` and `tail` characters
pub fn short_addr(addr: &str, head: usize, tail: usize) -> String {
    let chars: Vec<char> = addr.chars().collect();
    if chars.len() <= head + tail + 3 {
        return addr.to_string();
    }
    let start: String = chars[..head].iter().collect();
    let end: String = chars[chars.len() - tail..].iter().collect();
    format!("{}…{}", start, end)
}

/// Format a number with `,` thousands separators and fixed decimals
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let mut out = String::with_capacity(formatted.len() + int_part.len() / 3 + 1);
    if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        out.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Compact USD amount: `$1.23B`, `$4.50M`, `$7.10K`, `$950.00`
pub fn fmt_money(value: f64) -> String {
    if value >= 1_000_000_000.0 {
        format!("${:.2}B", value / 1_000_000_000.0)
    } else if value >= 1_000_000.0 {
        format!("${:.2}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("${:.2}K", value / 1_000.0)
    } else {
        format!("${}", group_thousands(value, 2))
    }
}

/// Token price with precision scaled to its magnitude
pub fn fmt_price(value: f64) -> String {
    if value >= 1.0 {
        format!("${:.4}", value)
    } else if value >= 0.01 {
        format!("${:.6}", value)
    } else {
        format!("${:.8}", value)
    }
}

/// Strength bar: one to five gems depending on the native amount spent
pub fn gem_bar(native_amount: f64) -> String {
    let gems = if native_amount >= 25.0 {
        5
    } else if native_amount >= 10.0 {
        4
    } else if native_amount >= 5.0 {
        3
    } else if native_amount >= 1.0 {
        2
    } else {
        1
    };
    "💎".repeat(gems)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Turn `@handle`, `handle` or a full URL into a Telegram link
pub fn telegram_handle_url(handle: &str) -> Option<String> {
    static NON_HANDLE: OnceLock<Regex> = OnceLock::new();

    let handle = handle.trim();
    if handle.starts_with("http://") || handle.starts_with("https://") {
        return Some(handle.to_string());
    }

    let re = NON_HANDLE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("handle pattern is valid"));
    let cleaned = re.replace_all(handle.trim_start_matches('@'), "");
    if cleaned.is_empty() {
        None
    } else {
        Some(format!("https://t.me/{}", cleaned))
    }
}

/// Content of one buy alert, already resolved for a destination
#[derive(Debug, Clone, Default)]
pub struct BuyMessage {
    pub symbol: String,
    pub native_symbol: String,
    pub native_amount: f64,
    pub usd_value: f64,
    pub token_amount: f64,
    pub buyer: String,
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub holders: Option<u64>,
    pub price_change_24h: Option<f64>,
    pub tx_url: String,
    pub explorer_url: String,
    pub chart_url: String,
    pub social_url: String,
    pub trending_url: String,
}

fn links_line(msg: &BuyMessage) -> String {
    [
        ("TX", &msg.tx_url),
        ("GT", &msg.explorer_url),
        ("DexS", &msg.chart_url),
        ("Telegram", &msg.social_url),
        ("Trending", &msg.trending_url),
    ]
    .iter()
    .filter(|(_, url)| !url.is_empty())
    .map(|(label, url)| format!("<a href=\"{}\">{}</a>", escape_html(url), label))
    .collect::<Vec<_>>()
    .join(" | ")
}

/// Render a buy alert as Telegram HTML
pub fn format_buy_message(msg: &BuyMessage) -> String {
    let symbol = escape_html(&msg.symbol);
    let change = msg
        .price_change_24h
        .map(|pct| format!("{:+.1}%", pct))
        .unwrap_or_else(|| "N/A".to_string());

    let mut lines = vec![
        format!("<b>{} Buy!</b>", symbol),
        String::new(),
        gem_bar(msg.native_amount),
        String::new(),
        format!(
            "💎 <b>{} {}</b> ({})",
            group_thousands(msg.native_amount, 2),
            escape_html(&msg.native_symbol),
            fmt_money(msg.usd_value)
        ),
        format!("🪙 <b>{}</b> {}", group_thousands(msg.token_amount, 4), symbol),
        String::new(),
        format!(
            "<code>{}</code>: <b>{}</b>",
            escape_html(&short_addr(&msg.buyer, 4, 4)),
            change
        ),
    ];

    if let Some(price) = msg.price_usd {
        lines.push(format!("Price: {}", fmt_price(price)));
    }
    if let Some(liquidity) = msg.liquidity_usd {
        lines.push(format!("Liquidity: {}", fmt_money(liquidity)));
    }
    if let Some(mcap) = msg.market_cap_usd {
        lines.push(format!("MCap: {}", fmt_money(mcap)));
    }
    if let Some(holders) = msg.holders {
        lines.push(format!("Holders: {}", group_thousands(holders as f64, 0)));
    }

    lines.push(String::new());
    lines.push(links_line(msg));
    lines.push("--------------------".to_string());
    lines.push("<i>You can book an ad here</i>".to_string());

    lines.join("\n")
}
