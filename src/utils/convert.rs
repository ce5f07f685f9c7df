use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Read a float that a data API may send as a number, a numeric string, or null
pub fn value_to_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Read a non-negative integer sent as a number or a string
pub fn value_to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.is_finite()).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Serde adapter for optional floats with lenient typing
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64))
}

/// Serde adapter for optional integers with lenient typing
pub fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_u64))
}

/// Strip the `<network>_` prefix GeckoTerminal puts on resource ids
pub fn strip_network_prefix<'a>(id: &'a str, network: &str) -> &'a str {
    id.strip_prefix(network)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(id)
}
