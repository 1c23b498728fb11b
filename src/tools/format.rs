//! Plain-text rendering of tool results for agents.

use serde_json::Value;

use crate::tools::executor::ExecutionResult;
use crate::tools::normalizer::{Normalized, ServiceRecord};

pub const NO_DATA: &str = "No data found";

/// Fields shown per record in a multi-record summary.
const SUMMARY_FIELDS: usize = 3;
/// Character budget for each summarised value.
const SUMMARY_VALUE_CHARS: usize = 50;

pub fn normalized(normalized: &Normalized) -> String {
    match normalized {
        Normalized::Records(records) => records_text(records),
        Normalized::Passthrough(values) => passthrough_text(values),
    }
}

/// Single record: full field dump. Several: numbered summary. None: `No data found`.
pub fn records_text(records: &[ServiceRecord]) -> String {
    match records {
        [] => NO_DATA.to_string(),
        [record] => single_record(record),
        _ => record_summary(records),
    }
}

fn single_record(record: &ServiceRecord) -> String {
    let mut out = format!("Service Data:\nID: {}\n", record.id);
    for (key, value) in &record.data {
        out.push_str(&format!("{}: {}\n", key, full_value(value)));
    }
    let metadata = serde_json::to_string_pretty(&record.metadata).unwrap_or_default();
    out.push_str(&format!("\nMetadata: {}", metadata));
    out
}

fn record_summary(records: &[ServiceRecord]) -> String {
    let mut out = format!("Found {} item(s):\n\n", records.len());
    for (index, record) in records.iter().enumerate() {
        out.push_str(&format!("{}. ID: {}\n", index + 1, record.id));
        for (key, value) in record.data.iter().take(SUMMARY_FIELDS) {
            out.push_str(&format!("   {}: {}\n", key, truncate(&compact_value(value), SUMMARY_VALUE_CHARS)));
        }
        out.push('\n');
    }
    out
}

fn passthrough_text(values: &[Value]) -> String {
    if values.is_empty() {
        return NO_DATA.to_string();
    }
    let noun = if values.len() == 1 { "category" } else { "categories" };
    let mut out = format!("Found {} {}:\n", values.len(), noun);
    for value in values {
        let label = match value {
            Value::String(s) => s.clone(),
            Value::Object(fields) => match fields.get("name") {
                Some(Value::String(name)) => name.clone(),
                _ => value.to_string(),
            },
            other => other.to_string(),
        };
        out.push_str(&format!("- {}\n", label));
    }
    out
}

/// Raw rendering used when no parser applies.
pub fn raw_response(result: &ExecutionResult) -> String {
    match (result.data(), result.error()) {
        (Some(data), _) => format!(
            "API Response (Status: {}):\n{}",
            result.status_code,
            serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
        ),
        (None, error) => api_error(result.status_code, error.unwrap_or("Unknown error")),
    }
}

pub fn api_error(status_code: u16, message: &str) -> String {
    format!("API Error (Status: {}): {}", status_code, message)
}

fn full_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

fn compact_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn record(value: Value) -> ServiceRecord {
        ServiceRecord::from_value(&value, Utc::now()).unwrap()
    }

    #[test]
    fn empty_is_never_blank() {
        assert_eq!(records_text(&[]), NO_DATA);
        assert_eq!(normalized(&Normalized::Passthrough(Vec::new())), NO_DATA);
    }

    #[test]
    fn single_record_dumps_every_field() {
        let text = records_text(&[record(json!({"id": "7", "name": "Widget", "tags": ["a"]}))]);
        assert!(text.starts_with("Service Data:\nID: 7\n"));
        assert!(text.contains("name: Widget\n"));
        assert!(text.contains("tags: [\n"));
        assert!(text.contains("\"source\": \"microservice\""));
    }

    #[test]
    fn summary_truncates_and_limits_fields() {
        let long = "x".repeat(80);
        let text = records_text(&[
            record(json!({"id": "1", "a": long, "b": 2, "c": 3})),
            record(json!({"id": "2"})),
        ]);
        assert!(text.starts_with("Found 2 item(s):\n\n1. ID: 1\n"));
        assert!(text.contains(&format!("   a: {}...\n", "x".repeat(50))));
        assert!(text.contains("   b: 2\n"));
        assert!(!text.contains("   c: 3"));
        assert!(text.contains("2. ID: 2\n"));
    }

    #[test]
    fn categories_are_listed() {
        let text = normalized(&Normalized::Passthrough(vec![
            json!("tools"),
            json!({"name": "garden", "id": 3}),
        ]));
        assert_eq!(text, "Found 2 categories:\n- tools\n- garden\n");
    }

    #[test]
    fn raw_response_renders_status_and_body() {
        let ok = ExecutionResult::success(201, json!({"created": true}));
        assert_eq!(
            raw_response(&ok),
            "API Response (Status: 201):\n{\n  \"created\": true\n}"
        );

        let failed = ExecutionResult::failure(503, "unavailable");
        assert_eq!(raw_response(&failed), "API Error (Status: 503): unavailable");
    }
}
