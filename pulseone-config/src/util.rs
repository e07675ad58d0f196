//! Small environment-parsing helpers, in the teacher's
//! `parse_bool`/`parse_csv_var` style.

/// Parse a boolean value from a raw string, accepting common env-style
/// forms (case-insensitive): `"1"/"true"/"yes"/"on"` and
/// `"0"/"false"/"no"/"off"`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_bool_var(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|raw| parse_bool(&raw))
}

pub fn parse_u32_var(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|raw| raw.parse().ok())
}

pub fn parse_f64_var(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|raw| raw.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_truthy_and_falsy_spellings() {
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("OFF"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
