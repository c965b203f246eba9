#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Ort(#[from] ort::Error),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    // Catch-all for external Classifier / ExplanationModel implementations.
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    #[error("Class index {index} is out of range for a model with {num_classes} classes.")]
    ClassIndexOutOfRange { index: usize, num_classes: usize },
    #[error("Input tensor has shape {actual:?}, but the model expects {expected:?}.")]
    InputShapeMismatch {
        expected: [usize; 4],
        actual: Vec<usize>,
    },
    #[error("The classifier does not expose a gradient graph, so saliency extraction is unsupported.")]
    GradientUnsupported,
    #[error("No explanation provider is configured.")]
    ExplanationUnavailable,
}
