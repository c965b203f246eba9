//! Plain-text report assembly and the ranked probability feed for the
//! per-class chart. String work only; nothing here touches tensors.

use std::path::Path;
use std::time::SystemTime;

use crate::interface::ClassProbability;
use crate::junk_drawer;

/// Ranks the class distribution for display: descending by probability,
/// with the predicted class flagged for highlighting. `predicted_index`
/// refers to the unsorted model output order.
pub fn ranked_probabilities(
    labels: &[String],
    probabilities: &[f32],
    predicted_index: usize,
) -> Vec<ClassProbability> {
    let mut ranked: Vec<ClassProbability> = labels
        .iter()
        .zip(probabilities.iter())
        .enumerate()
        .map(|(index, (label, probability))| ClassProbability {
            label: label.clone(),
            probability: *probability,
            predicted: index == predicted_index,
        })
        .collect();
    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranked
}

/// Assembles the comprehensive analysis report shown to the clinician.
/// `image_path` is the persisted composite (or the upload, when no overlay
/// was generated); `explanation` is whatever the language model produced,
/// or a placeholder when no provider was configured.
pub fn comprehensive_report(
    image_path: &Path,
    predicted_label: &str,
    confidence: f32,
    explanation: &str,
    ranked: &[ClassProbability],
) -> String {
    let mut report = format!(
        "Brain Tumor MRI Analysis Report\n\
         ============================================\n\
         Generated: {}\n\
         \n\
         **Prediction Summary**\n\
         - Predicted Class: {}\n\
         - Confidence: {:.2}%\n\
         \n\
         **Explanations**\n\
         {}\n\
         \n\
         **Prediction Probabilities**\n",
        junk_drawer::system_time_to_string(SystemTime::now()),
        predicted_label,
        confidence * 100.0,
        explanation,
    );

    for bar in ranked {
        report += &format!("- {}: {:.2}%\n", bar.label, bar.probability * 100.0);
    }

    report += "\n\
        **Historical Cases and Insights**\n\
        - Glioma: Often appears in cerebral hemispheres; aggressive.\n\
        - Meningioma: Typically benign and slow-growing.\n\
        - Pituitary Tumor: Common in the pituitary gland; treatable.\n\
        - No Tumor: Indicates a healthy brain scan.\n\
        \n\
        **Next Steps for Doctors**\n\
        - Confirm results with additional diagnostic tests such as biopsy or advanced imaging.\n\
        - Collaborate with radiologists to validate model interpretations.\n\
        - Use highlighted regions from saliency maps for targeted analysis.\n\
        \n\
        **Next Steps for Patient Care**\n\
        - Schedule follow-ups with specialists (e.g., neurologists or oncologists).\n\
        - Discuss potential treatment plans based on findings.\n\
        - Provide educational resources to patients about their diagnosis.\n\
        \n\
        **Analyzed Image Path**\n";
    report += &format!("{}\n", image_path.display());

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["Glioma", "Meningioma", "No tumor", "Pituitary"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn ranking_is_descending_with_predicted_flag() {
        let probabilities = [0.05, 0.6, 0.25, 0.1];
        let ranked = ranked_probabilities(&labels(), &probabilities, 1);

        let order: Vec<&str> = ranked.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(order, ["Meningioma", "No tumor", "Pituitary", "Glioma"]);
        assert!(ranked[0].predicted);
        assert!(ranked.iter().skip(1).all(|b| !b.predicted));
    }

    #[test]
    fn predicted_flag_follows_model_output_order_not_rank() {
        // Predicted index refers to the unsorted distribution; here the
        // predicted class lands mid-table after ranking.
        let probabilities = [0.4, 0.3, 0.2, 0.1];
        let ranked = ranked_probabilities(&labels(), &probabilities, 2);

        let flagged: Vec<&str> = ranked
            .iter()
            .filter(|b| b.predicted)
            .map(|b| b.label.as_str())
            .collect();
        assert_eq!(flagged, ["No tumor"]);
    }

    #[test]
    fn report_contains_every_section_and_class_line() {
        let probabilities = [0.05, 0.6, 0.25, 0.1];
        let ranked = ranked_probabilities(&labels(), &probabilities, 1);
        let report = comprehensive_report(
            Path::new("/data/saliency_maps/scan_042.jpg"),
            "Meningioma",
            0.6,
            "The model focused on a convexity near the falx.",
            &ranked,
        );

        assert!(report.contains("**Prediction Summary**"));
        assert!(report.contains("- Predicted Class: Meningioma"));
        assert!(report.contains("- Confidence: 60.00%"));
        assert!(report.contains("The model focused on a convexity near the falx."));
        assert!(report.contains("- No tumor: 25.00%"));
        assert!(report.contains("**Historical Cases and Insights**"));
        assert!(report.contains("**Next Steps for Patient Care**"));
        assert!(report.contains("/data/saliency_maps/scan_042.jpg"));
    }
}
