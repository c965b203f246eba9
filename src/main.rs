use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use neuroscan::classifier::{Classifier, OnnxClassifier};
use neuroscan::error::Error;
use neuroscan::explanation::{
    self, ChatSession, DisabledExplanationModel, ExplanationModel, ExplanationContext,
};
use neuroscan::interface::{AnalysisSummary, ImageSize, Prediction};
use neuroscan::junk_drawer;
use neuroscan::preprocessing;
use neuroscan::report;
use neuroscan::saliency::{self, SaliencyConfig};
use neuroscan::storage;

/// Model output order of the reference tumor classifiers.
const DEFAULT_LABELS: [&str; 4] = ["Glioma", "Meningioma", "No tumor", "Pituitary"];

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Classify a brain MRI scan and render a gradient saliency overlay"
)]
struct Cli {
    /// The MRI scan to analyze (jpg, jpeg, or png)
    image: PathBuf,

    /// ONNX classifier with a PROBABILITIES output head
    #[arg(long)]
    model: PathBuf,

    /// Companion ONNX graph with a CLASS_GRADIENTS output; omit to skip the
    /// saliency overlay
    #[arg(long)]
    gradient_model: Option<PathBuf>,

    /// Square input geometry the model was trained for, in pixels
    /// (299 for the transfer-learning model, 224 for the custom CNN)
    #[arg(long, default_value_t = 299)]
    input_size: u32,

    /// Class labels in model output order, comma separated
    #[arg(long, value_delimiter = ',')]
    labels: Vec<String>,

    /// Directory for persisted saliency composites (defaults to the
    /// platform's app-data directory)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Write the analysis summary to this path as JSON
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Open an interactive follow-up chat after printing the report
    #[arg(long)]
    chat: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let labels = if cli.labels.is_empty() {
        DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
    } else {
        cli.labels.clone()
    };

    let classifier = OnnxClassifier::new(
        &cli.model,
        cli.gradient_model.as_deref(),
        labels,
        (cli.input_size, cli.input_size),
    )
    .with_context(|| format!("Error loading classifier from {:?}", cli.model))?;

    let upload = preprocessing::load_upload(&cli.image)?;
    let resized = preprocessing::resize_to_input(&upload, classifier.input_size());
    let input = preprocessing::image_to_model_format(&resized);

    let now = std::time::Instant::now();
    let probabilities = classifier.predict(&input)?;
    info!("Inference took {:?}", now.elapsed());

    let (class_index, confidence) = argmax(probabilities.as_slice().unwrap_or(&[]))
        .ok_or(anyhow::anyhow!("Classifier returned an empty distribution"))?;
    let predicted_label = classifier.labels()[class_index].clone();
    info!("Predicted class: {} ({:.2}%)", predicted_label, confidence * 100.0);

    let ranked = report::ranked_probabilities(classifier.labels(), probabilities.as_slice().unwrap_or(&[]), class_index);
    for bar in &ranked {
        info!("{}: {:.4}", bar.label, bar.probability);
    }

    // The saliency overlay needs the gradient capability; without the
    // companion graph we keep going and report on the prediction alone.
    let saliency_path = if cli.gradient_model.is_some() {
        let config = SaliencyConfig::new(classifier.input_size());

        let now = std::time::Instant::now();
        let composite =
            saliency::generate_saliency_map(&classifier, &input, class_index, &resized, &config)?;
        info!("Saliency map took {:?}", now.elapsed());

        let storage_dir = match &cli.storage_dir {
            Some(dir) => dir.clone(),
            None => storage::default_storage_dir()?,
        };
        let filename = junk_drawer::filename_from_path(&cli.image)?;
        Some(storage::persist_composite(&composite, &storage_dir, &filename)?)
    } else {
        warn!("No gradient model supplied; skipping the saliency overlay");
        None
    };

    let model = DisabledExplanationModel;
    let prompt = explanation::explanation_prompt(&predicted_label, confidence);
    let explanation_text = match model.generate(&prompt, saliency_path.as_deref()) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Explanation unavailable: {}", e);
            None
        }
    };

    let report_image = saliency_path.as_deref().unwrap_or(&cli.image);
    let report_text = report::comprehensive_report(
        report_image,
        &predicted_label,
        confidence,
        explanation_text
            .as_deref()
            .unwrap_or("(explanation unavailable: no provider configured)"),
        &ranked,
    );
    println!("{}", report_text);

    if let Some(json_path) = &cli.json_out {
        let summary = AnalysisSummary {
            analysis_id: uuid::Uuid::new_v4().to_string(),
            source_image: cli.image.display().to_string(),
            saliency_map: saliency_path.as_ref().map(|p| p.display().to_string()),
            display_size: ImageSize {
                width: classifier.input_size().0,
                height: classifier.input_size().1,
            },
            prediction: Prediction {
                label: predicted_label.clone(),
                confidence,
            },
            probabilities: ranked.clone(),
            explanation: explanation_text.clone(),
            report: report_text.clone(),
            generated_at: junk_drawer::system_time_to_string(std::time::SystemTime::now()),
        };
        std::fs::write(json_path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("Error writing analysis summary to {:?}", json_path))?;
        info!("Wrote analysis summary to {:?}", json_path);
    }

    if cli.chat {
        let context = ExplanationContext {
            predicted_label: &predicted_label,
            confidence,
            explanation: explanation_text
                .as_deref()
                .unwrap_or("(no explanation was generated)"),
        };
        chat_loop(&model, &context)?;
    }

    Ok(())
}

/// Index and value of the distribution's maximum.
fn argmax(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
}

/// Reads follow-up questions from stdin until EOF or an empty line.
/// Provider failures are printed as plain messages rather than ending the
/// session; the user can keep asking.
fn chat_loop(model: &dyn ExplanationModel, context: &ExplanationContext<'_>) -> anyhow::Result<()> {
    let mut session = ChatSession::new();
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    println!("Chat with the MRI assistant. Empty line to quit.");
    loop {
        print!("You: ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if query.is_empty() {
            break;
        }

        match session.ask(model, context, query) {
            Ok(reply) => println!("MRI assistant: {}", reply),
            Err(Error::ExplanationUnavailable) => {
                println!("MRI assistant: (no explanation provider is configured)")
            }
            Err(e) => println!("MRI assistant: request failed: {}", e),
        }
    }

    info!("Chat session {} closed after {} messages", session.id(), session.messages().len());
    Ok(())
}
