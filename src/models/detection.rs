use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel shown in place of a similarity score for unidentified faces.
pub const SIMILARITY_SENTINEL: &str = "NULL";

/// Box in sampled-frame pixels, top-left origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One face found in one sampled frame, exactly as the detection service reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawDetection {
    #[serde(rename = "user_id", default, skip_serializing_if = "Option::is_none")]
    pub subject_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
    /// Distance score; lower means more similar.
    #[serde(rename = "distance", default)]
    pub similarity: f64,
    pub bounding_box: BoundingBox,
}

impl RawDetection {
    pub fn identified(subject_ref: impl Into<String>, similarity: f64, bounding_box: BoundingBox) -> Self {
        Self {
            subject_ref: Some(subject_ref.into()),
            visitor_id: None,
            similarity,
            bounding_box,
        }
    }

    pub fn visitor(bounding_box: BoundingBox) -> Self {
        Self {
            subject_ref: None,
            visitor_id: None,
            similarity: 0.0,
            bounding_box,
        }
    }

    /// The identity reference, if any. An empty reference counts as absent.
    pub fn subject(&self) -> Option<&str> {
        self.subject_ref.as_deref().filter(|id| !id.is_empty())
    }

    pub fn formatted_similarity(&self) -> String {
        match self.subject() {
            Some(_) => format!("{:.3}", self.similarity),
            None => SIMILARITY_SENTINEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Category {
    #[serde(rename = "Student")]
    Student,
    /// Visitors are shown without a name or category.
    #[serde(rename = "")]
    Unidentified,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Student => "Student",
            Category::Unidentified => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedDetection {
    /// Ordinal position of the raw detection this row derives from.
    pub index: usize,
    pub display_name: String,
    pub category: Category,
    pub formatted_similarity: String,
}

impl EnrichedDetection {
    pub fn unidentified(index: usize) -> Self {
        Self {
            index,
            display_name: String::new(),
            category: Category::Unidentified,
            formatted_similarity: SIMILARITY_SENTINEL.to_string(),
        }
    }

    pub fn student(index: usize, display_name: String, raw: &RawDetection) -> Self {
        Self {
            index,
            display_name,
            category: Category::Student,
            formatted_similarity: raw.formatted_similarity(),
        }
    }
}

/// The current authoritative snapshot: raw results and their enrichment,
/// always replaced together.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetectionBatch {
    pub raw_results: Vec<RawDetection>,
    pub enriched_results: Vec<EnrichedDetection>,
    pub received_at: Option<DateTime<Utc>>,
}

impl DetectionBatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(raw_results: Vec<RawDetection>, enriched_results: Vec<EnrichedDetection>) -> Self {
        debug_assert_eq!(raw_results.len(), enriched_results.len());
        Self {
            raw_results,
            enriched_results,
            received_at: Some(Utc::now()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw_results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.raw_results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_payload() {
        let json = r#"{
            "user_id": "u1",
            "distance": 0.42,
            "bounding_box": {"x": 0, "y": 0, "width": 100, "height": 100}
        }"#;
        let raw: RawDetection = serde_json::from_str(json).unwrap();
        assert_eq!(raw.subject(), Some("u1"));
        assert_eq!(raw.bounding_box, BoundingBox::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(raw.formatted_similarity(), "0.420");
    }

    #[test]
    fn visitor_id_is_not_a_subject() {
        let json = r#"{
            "visitor_id": "v9",
            "distance": 0.8,
            "bounding_box": {"x": 1, "y": 2, "width": 3, "height": 4}
        }"#;
        let raw: RawDetection = serde_json::from_str(json).unwrap();
        assert_eq!(raw.subject(), None);
        assert_eq!(raw.visitor_id.as_deref(), Some("v9"));
        assert_eq!(raw.formatted_similarity(), SIMILARITY_SENTINEL);
    }

    #[test]
    fn empty_subject_counts_as_absent() {
        let raw = RawDetection::identified("", 0.1, BoundingBox::default());
        assert_eq!(raw.subject(), None);
    }

    #[test]
    fn category_serializes_as_bare_label() {
        let student = serde_json::to_value(Category::Student).unwrap();
        let visitor = serde_json::to_value(Category::Unidentified).unwrap();
        assert_eq!(student, serde_json::json!("Student"));
        assert_eq!(visitor, serde_json::json!(""));
    }

    #[test]
    fn enriched_row_uses_camel_case() {
        let row = EnrichedDetection::unidentified(2);
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["displayName"], "");
        assert_eq!(value["category"], "");
        assert_eq!(value["formattedSimilarity"], "NULL");
        assert_eq!(value["index"], 2);
    }
}
