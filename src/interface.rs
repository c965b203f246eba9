/// This module contains the structs handed to a presentation layer.
/// They are serialized as JSON objects, so their field names are part of
/// the contract and should be kept in sync with whatever renders them.

use serde::{Deserialize, Serialize};

/// The size of an image, in pixels.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ImageSize
{
    pub width: u32,
    pub height: u32,
}

/// The winning class for one analysis.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Prediction
{
    pub label: String,
    pub confidence: f32,
}

/// One bar of the per-class probability chart. Bars are emitted in
/// descending probability order; `predicted` flags the bar the renderer
/// should highlight.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClassProbability
{
    pub label: String,
    pub probability: f32,
    pub predicted: bool,
}

/// Everything the presentation layer needs to show one finished analysis:
/// the prediction block, the chart feed, the persisted overlay path, and
/// the report text.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AnalysisSummary
{
    pub analysis_id: String,
    pub source_image: String,
    /// Path to the persisted saliency composite; None when the classifier
    /// had no gradient capability.
    pub saliency_map: Option<String>,
    pub display_size: ImageSize,
    pub prediction: Prediction,
    pub probabilities: Vec<ClassProbability>,
    /// None when no explanation provider was configured.
    pub explanation: Option<String>,
    pub report: String,
    pub generated_at: String,
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn class_probability_serialization()
    {
        let bar = ClassProbability
        {
            label: "Glioma".to_string(),
            probability: 0.62,
            predicted: true,
        };
        let serialized = serde_json::to_string(&bar).unwrap();
        let deserialized: ClassProbability = serde_json::from_str(&serialized).unwrap();
        assert_eq!(bar, deserialized);
    }

    #[test]
    fn analysis_summary_serialization()
    {
        let summary = AnalysisSummary
        {
            analysis_id: "5a9e1a9e-0000-0000-0000-000000000000".to_string(),
            source_image: "scan_042.jpg".to_string(),
            saliency_map: Some("/data/saliency_maps/scan_042.jpg".to_string()),
            display_size: ImageSize { width: 299, height: 299 },
            prediction: Prediction { label: "Meningioma".to_string(), confidence: 0.91 },
            probabilities: vec![ClassProbability
            {
                label: "Meningioma".to_string(),
                probability: 0.91,
                predicted: true,
            }],
            explanation: None,
            report: "report body".to_string(),
            generated_at: "2025-01-01 12:00:00".to_string(),
        };
        let serialized = serde_json::to_string(&summary).unwrap();
        let deserialized: AnalysisSummary = serde_json::from_str(&serialized).unwrap();
        assert_eq!(summary, deserialized);
    }
}
