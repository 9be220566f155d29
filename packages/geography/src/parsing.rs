//! Shared cell parsing for the tabular and feature inputs.

/// Trims whitespace and surrounding double quotes.
#[must_use]
pub fn clean_cell(s: &str) -> &str {
    s.trim().trim_matches('"').trim()
}

/// Parses a number that may use a German decimal comma (`12,49`) and dot
/// thousands grouping (`1.234,5`). Returns `None` for empty cells, dashes
/// and anything that is not a finite number.
#[must_use]
pub fn parse_decimal(s: &str) -> Option<f64> {
    let cell = clean_cell(s);
    if cell.is_empty() || cell.chars().all(|c| matches!(c, '-' | '.' | ',')) {
        return None;
    }

    let normalized = if cell.contains(',') {
        cell.replace('.', "").replace(',', ".")
    } else {
        cell.to_string()
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Renders a `GeoJSON` property as an identifier string.
///
/// Numbers keep their serialized form (`9161000.0`) so that the normalizer
/// sees the same artifacts it would in a CSV.
#[must_use]
pub fn property_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Finds a header by exact name, falling back to a case-insensitive match.
#[must_use]
pub fn find_column(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name).or_else(|| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_german_decimal() {
        assert_eq!(parse_decimal("12,49"), Some(12.49));
        assert_eq!(parse_decimal("\"12,49\""), Some(12.49));
        assert_eq!(parse_decimal("1.234,5"), Some(1234.5));
    }

    #[test]
    fn parses_plain_decimal() {
        assert_eq!(parse_decimal("12.49"), Some(12.49));
        assert_eq!(parse_decimal(" 7 "), Some(7.0));
        assert_eq!(parse_decimal("-3.5"), Some(-3.5));
    }

    #[test]
    fn rejects_placeholders() {
        for cell in ["", "  ", "-", ".", "x", "n/a", "NaN", "inf"] {
            assert_eq!(parse_decimal(cell), None, "cell {cell:?}");
        }
    }

    #[test]
    fn renders_numeric_properties() {
        let n = serde_json::json!(9_161_000.0);
        assert_eq!(property_to_string(&n).as_deref(), Some("9161000.0"));
        let s = serde_json::json!("09161");
        assert_eq!(property_to_string(&s).as_deref(), Some("09161"));
        assert_eq!(property_to_string(&serde_json::Value::Null), None);
    }

    #[test]
    fn finds_columns_case_insensitively() {
        let headers = vec!["Kennziffer".to_string(), "AGS5".to_string()];
        assert_eq!(find_column(&headers, "AGS5"), Some(1));
        assert_eq!(find_column(&headers, "kennziffer"), Some(0));
        assert_eq!(find_column(&headers, "value"), None);
    }
}
