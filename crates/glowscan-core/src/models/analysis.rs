use serde::{Deserialize, Serialize};

/// Response of the scan model's `/analyze` endpoint.
///
/// The prediction payload belongs to the model service and is kept as raw
/// JSON; callers pick out what they display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: String,
    #[serde(default)]
    pub prediction: Option<serde_json::Value>,
    /// Base64 image with detections drawn on it.
    #[serde(default, alias = "annotatedImage")]
    pub annotated_image: Option<String>,
}

impl AnalysisResult {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }

    /// Top-level condition label, when the model reports one.
    pub fn condition(&self) -> Option<&str> {
        let prediction = self.prediction.as_ref()?;
        prediction
            .as_str()
            .or_else(|| prediction.get("label").and_then(|v| v.as_str()))
            .or_else(|| prediction.get("condition").and_then(|v| v.as_str()))
    }
}
