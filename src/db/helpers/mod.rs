use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("failed to parse {field}"))
}

/// Device and name lists are stored as JSON arrays in a TEXT column.
pub fn encode_list(values: &[String]) -> Result<String> {
    serde_json::to_string(values).context("failed to encode list column")
}

pub fn decode_list(value: &str, field: &str) -> Result<Vec<String>> {
    serde_json::from_str(value).with_context(|| format!("failed to decode {field}"))
}

pub fn unknown_value(field: &str, value: &str) -> anyhow::Error {
    anyhow!("unknown {field} '{value}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_columns_round_trip_through_json() {
        let devices = vec!["D1".to_string(), "D2".to_string()];
        let encoded = encode_list(&devices).unwrap();
        assert_eq!(encoded, r#"["D1","D2"]"#);
        assert_eq!(decode_list(&encoded, "device_numbers").unwrap(), devices);
    }

    #[test]
    fn malformed_datetime_names_the_field() {
        let err = parse_datetime("yesterday", "started_at").unwrap_err();
        assert!(err.to_string().contains("started_at"));
    }
}
