use serde::{Deserialize, Serialize};

/// Content type of one vector collection. Each indexed document lives in
/// exactly one modality's collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Screen,
}

impl Modality {
    pub const ALL: [Self; 3] = [Self::Text, Self::Image, Self::Screen];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Screen => "screen",
        }
    }

    /// Collection name for this modality under the given prefix.
    #[must_use]
    pub fn collection(self, prefix: &str) -> String {
        format!("{prefix}_{}", self.as_str())
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive unix-seconds interval for time-scoped queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    #[must_use]
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Caller-supplied restrictions on a retrieval query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    /// Restrict the search to these modalities; `None` means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<Modality>>,
}

impl QueryFilters {
    #[must_use]
    pub fn allows(&self, modality: Modality) -> bool {
        self.modalities
            .as_ref()
            .is_none_or(|m| m.contains(&modality))
    }
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Region within the source image, `[x, y, width, height]` in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// One retrieved candidate: a redacted snippet plus scores and provenance.
///
/// `score` is only comparable across modalities after fusion normalization;
/// `rerank_score` is present only for image candidates that went through the
/// reranking pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub doc_id: String,
    #[serde(rename = "source")]
    pub modality: Modality,
    pub snippet: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    #[serde(default)]
    pub provenance: Provenance,
    /// Base64 image content for VLM conditioning; never serialized into
    /// responses.
    #[serde(skip)]
    pub image_data: Option<String>,
}

impl Evidence {
    /// Score used for final ordering: rerank score when present, fused
    /// score otherwise.
    #[must_use]
    pub fn effective_score(&self) -> f32 {
        self.rerank_score.unwrap_or(self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_collection_names() {
        assert_eq!(Modality::Text.collection("sift"), "sift_text");
        assert_eq!(Modality::Screen.collection("sift"), "sift_screen");
    }

    #[test]
    fn modality_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Modality::Image).unwrap(), "\"image\"");
        let back: Modality = serde_json::from_str("\"screen\"").unwrap();
        assert_eq!(back, Modality::Screen);
    }

    #[test]
    fn time_range_inclusive() {
        let r = TimeRange { start: 10, end: 20 };
        assert!(r.contains(10));
        assert!(r.contains(20));
        assert!(!r.contains(9));
        assert!(!r.contains(21));
    }

    #[test]
    fn default_filters_allow_all_modalities() {
        let f = QueryFilters::default();
        for m in Modality::ALL {
            assert!(f.allows(m));
        }
    }

    #[test]
    fn modality_filter_restricts() {
        let f = QueryFilters {
            time_range: None,
            modalities: Some(vec![Modality::Text]),
        };
        assert!(f.allows(Modality::Text));
        assert!(!f.allows(Modality::Image));
    }

    #[test]
    fn effective_score_prefers_rerank() {
        let mut e = Evidence {
            doc_id: "d".into(),
            modality: Modality::Image,
            snippet: String::new(),
            score: 0.4,
            rerank_score: None,
            provenance: Provenance::default(),
            image_data: None,
        };
        assert!((e.effective_score() - 0.4).abs() < f32::EPSILON);
        e.rerank_score = Some(0.9);
        assert!((e.effective_score() - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn image_data_not_serialized() {
        let e = Evidence {
            doc_id: "d".into(),
            modality: Modality::Image,
            snippet: "chart".into(),
            score: 1.0,
            rerank_score: None,
            provenance: Provenance::default(),
            image_data: Some("aGk=".into()),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(!json.contains("aGk="));
    }

    #[test]
    fn modality_serializes_as_source_field() {
        let e = Evidence {
            doc_id: "d".into(),
            modality: Modality::Screen,
            snippet: String::new(),
            score: 1.0,
            rerank_score: None,
            provenance: Provenance::default(),
            image_data: None,
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["source"], "screen");
    }
}
