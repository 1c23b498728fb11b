//! Response Normalizer: reshapes backend JSON into uniform records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::error::{NormalizationError, json_kind};
use crate::mapping::ResponseParser;
use crate::tools::executor::ExecutionResult;

/// Source tag stamped on every record.
pub const RECORD_SOURCE: &str = "microservice";

/// Id fields, in priority order.
const ID_FIELDS: [&str; 3] = ["id", "item_id", "_id"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordMetadata {
    pub fetched_at: DateTime<Utc>,
    pub source: String,
}

/// One normalised unit of backend data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRecord {
    pub id: String,
    /// The original object, id field included
    pub data: Map<String, Value>,
    pub metadata: RecordMetadata,
}

impl ServiceRecord {
    /// Build a record from one JSON object.
    pub fn from_value(value: &Value, fetched_at: DateTime<Utc>) -> Result<Self, NormalizationError> {
        let Value::Object(fields) = value else {
            return Err(NormalizationError::NotAnObject(json_kind(value)));
        };
        let id = resolve_id(fields).ok_or(NormalizationError::MissingId)?;
        Ok(Self {
            id,
            data: fields.clone(),
            metadata: RecordMetadata {
                fetched_at,
                source: RECORD_SOURCE.to_string(),
            },
        })
    }
}

/// Result of normalising one response.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Records(Vec<ServiceRecord>),
    /// Already-shaped output such as a category list, passed through as-is
    Passthrough(Vec<Value>),
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        match self {
            Normalized::Records(records) => records.is_empty(),
            Normalized::Passthrough(values) => values.is_empty(),
        }
    }
}

/// Normalise `result` with `parser`; `None` means structural parsing.
///
/// A failed result yields no records. Elements that cannot become records
/// are logged and dropped; the rest of the batch is kept.
pub fn normalize(result: &ExecutionResult, parser: Option<ResponseParser>) -> Normalized {
    let Some(data) = result.data() else {
        return Normalized::Records(Vec::new());
    };
    let fetched_at = result.received_at;

    match parser.unwrap_or(ResponseParser::Structural) {
        ResponseParser::Item => {
            let records = match ServiceRecord::from_value(data, fetched_at) {
                Ok(record) => vec![record],
                Err(e) => {
                    warn!("Dropping item from response: {}", e);
                    Vec::new()
                }
            };
            Normalized::Records(records)
        }
        ResponseParser::Categories => {
            let categories = match data {
                Value::Object(fields) => match fields.get("categories") {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                },
                Value::Array(items) => items.clone(),
                _ => Vec::new(),
            };
            Normalized::Passthrough(categories)
        }
        ResponseParser::ItemsList => Normalized::Records(parse_items_field(data, fetched_at)),
        ResponseParser::Structural => match data {
            Value::Array(items) => Normalized::Records(parse_each(items, fetched_at)),
            Value::Object(_) => Normalized::Records(parse_items_field(data, fetched_at)),
            _ => Normalized::Records(Vec::new()),
        },
    }
}

fn parse_items_field(data: &Value, fetched_at: DateTime<Utc>) -> Vec<ServiceRecord> {
    match data.get("items") {
        Some(Value::Array(items)) => parse_each(items, fetched_at),
        _ => Vec::new(),
    }
}

fn parse_each(items: &[Value], fetched_at: DateTime<Utc>) -> Vec<ServiceRecord> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match ServiceRecord::from_value(item, fetched_at) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Dropping element {} from response: {}", index, e);
                None
            }
        })
        .collect()
}

/// First usable id among `id`, `item_id`, `_id`.
///
/// Non-empty strings and numbers resolve. An `_id` of the form
/// `{"$oid": "..."}` resolves to the inner string.
fn resolve_id(fields: &Map<String, Value>) -> Option<String> {
    ID_FIELDS.iter().find_map(|field| match fields.get(*field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(inner) if *field == "_id" => match inner.get("$oid") {
            Some(Value::String(oid)) if !oid.is_empty() => Some(oid.clone()),
            _ => None,
        },
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(data: Value) -> ExecutionResult {
        ExecutionResult::success(200, data)
    }

    fn ids(normalized: &Normalized) -> Vec<&str> {
        match normalized {
            Normalized::Records(records) => records.iter().map(|r| r.id.as_str()).collect(),
            Normalized::Passthrough(_) => panic!("expected records"),
        }
    }

    #[test]
    fn record_keeps_id_and_full_data() {
        let value = json!({"id": "42", "name": "x"});
        let record = ServiceRecord::from_value(&value, Utc::now()).unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(Value::Object(record.data), value);
        assert_eq!(record.metadata.source, RECORD_SOURCE);
    }

    #[test]
    fn id_fields_resolve_in_priority_order() {
        let now = Utc::now();
        let from_item_id = json!({"id": "", "item_id": 9, "_id": "z"});
        assert_eq!(ServiceRecord::from_value(&from_item_id, now).unwrap().id, "9");

        let from_oid = json!({"_id": {"$oid": "65f0c0ffee"}});
        assert_eq!(ServiceRecord::from_value(&from_oid, now).unwrap().id, "65f0c0ffee");

        let none = json!({"id": null, "name": "nameless"});
        assert_eq!(
            ServiceRecord::from_value(&none, now),
            Err(NormalizationError::MissingId)
        );
        assert_eq!(
            ServiceRecord::from_value(&json!("7"), now),
            Err(NormalizationError::NotAnObject("string"))
        );
    }

    #[test]
    fn normalizing_twice_gives_equal_records() {
        let result = ok(json!({"items": [{"id": "1"}, {"id": "2"}]}));
        let first = normalize(&result, Some(ResponseParser::ItemsList));
        let second = normalize(&result, Some(ResponseParser::ItemsList));
        assert_eq!(first, second);
    }

    #[test]
    fn item_parser_yields_zero_or_one() {
        let one = normalize(&ok(json!({"id": "7", "name": "Widget"})), Some(ResponseParser::Item));
        assert_eq!(ids(&one), vec!["7"]);

        let none = normalize(&ok(json!({"name": "Widget"})), Some(ResponseParser::Item));
        assert!(none.is_empty());
    }

    #[test]
    fn categories_are_passed_through() {
        let result = ok(json!({"categories": ["tools", {"name": "garden"}]}));
        assert_eq!(
            normalize(&result, Some(ResponseParser::Categories)),
            Normalized::Passthrough(vec![json!("tools"), json!({"name": "garden"})])
        );
    }

    #[test]
    fn items_list_drops_bad_elements() {
        let result = ok(json!({"items": [{"id": "1"}, "junk", {"name": "no id"}, {"_id": "3"}]}));
        let normalized = normalize(&result, Some(ResponseParser::ItemsList));
        assert_eq!(ids(&normalized), vec!["1", "3"]);
    }

    #[test]
    fn structural_fallback_handles_arrays_and_items() {
        let array = normalize(&ok(json!([{"id": "a"}, {"id": "b"}])), None);
        assert_eq!(ids(&array), vec!["a", "b"]);

        let wrapped = normalize(&ok(json!({"items": [{"id": "c"}]})), Some(ResponseParser::Structural));
        assert_eq!(ids(&wrapped), vec!["c"]);

        let scalar = normalize(&ok(json!(5)), None);
        assert!(scalar.is_empty());

        let plain_object = normalize(&ok(json!({"id": "d"})), None);
        assert!(plain_object.is_empty());
    }

    #[test]
    fn failed_result_yields_nothing() {
        let result = ExecutionResult::failure(500, "boom");
        assert!(normalize(&result, Some(ResponseParser::Item)).is_empty());
    }
}
