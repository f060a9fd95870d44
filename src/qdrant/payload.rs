//! Helpers for constructing and reading summary payloads.

use crate::extraction::ElementKind;
use crate::qdrant::types::SummaryPoint;
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Build the payload object stored alongside each summary vector.
pub(crate) fn build_payload(point: &SummaryPoint, timestamp_rfc3339: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("element_id".into(), Value::String(point.id.clone()));
    payload.insert("kind".into(), Value::String(point.kind.as_str().to_string()));
    payload.insert("text".into(), Value::String(point.text.clone()));
    payload.insert("source".into(), Value::String(point.source.clone()));
    if let Some(page) = point.page_number {
        payload.insert("page_number".into(), Value::from(page));
    }
    payload.insert(
        "indexed_at".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Summary fields read back from a stored payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryPayload {
    /// Element identifier, falling back to the point id when absent.
    pub element_id: String,
    /// Element kind tag.
    pub kind: Option<ElementKind>,
    /// Summary text.
    pub text: String,
}

/// Decode the fields written by [`build_payload`].
pub fn read_payload(point_id: &str, payload: Option<&Map<String, Value>>) -> SummaryPayload {
    let field = |key: &str| {
        payload
            .and_then(|map| map.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    SummaryPayload {
        element_id: field("element_id").unwrap_or_else(|| point_id.to_string()),
        kind: field("kind").and_then(|label| ElementKind::from_label(&label)),
        text: field("text").unwrap_or_default(),
    }
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }

    #[test]
    fn payload_round_trips_kind_and_text() {
        let point = SummaryPoint {
            id: "4b7e".into(),
            kind: ElementKind::Table,
            text: "Revenue by quarter".into(),
            source: "report.pdf".into(),
            page_number: Some(4),
            vector: vec![0.0; 3],
        };
        let payload = build_payload(&point, "2025-01-01T00:00:00Z");
        assert_eq!(payload["page_number"], 4);
        assert_eq!(payload["indexed_at"], "2025-01-01T00:00:00Z");

        let decoded = read_payload("ignored", payload.as_object());
        assert_eq!(decoded.element_id, "4b7e");
        assert_eq!(decoded.kind, Some(ElementKind::Table));
        assert_eq!(decoded.text, "Revenue by quarter");
    }

    #[test]
    fn missing_payload_falls_back_to_point_id() {
        let decoded = read_payload("point-1", None);
        assert_eq!(decoded.element_id, "point-1");
        assert_eq!(decoded.kind, None);
        assert!(decoded.text.is_empty());
    }
}
