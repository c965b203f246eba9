use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array, Array1, Array4};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::error::Error;

/// A trained image classifier over a fixed label set.
///
/// `predict()` returns the probability distribution over `labels()`.
/// `class_gradient()` is a *capability*: the gradient of one class score
/// with respect to the input tensor. Not every classifier can provide it
/// (a model with non-differentiable post-processing cannot), in which case
/// the implementation fails with `Error::GradientUnsupported` and the
/// saliency pipeline surfaces that to the caller.
///
/// Input tensors are single-image NHWC batches, f32 in [0, 1]. See
/// preprocessing::image_to_model_format().
pub trait Classifier
{
    fn labels(&self) -> &[String];

    /// Expected input geometry as (width, height).
    fn input_size(&self) -> (u32, u32);

    fn predict(&self, input: &Array4<f32>) -> Result<Array1<f32>, Error>;

    fn class_gradient(&self, input: &Array4<f32>, class_index: usize) -> Result<Array4<f32>, Error>;

    /// The NHWC shape `predict()` and `class_gradient()` accept.
    fn expected_shape(&self) -> [usize; 4]
    {
        let (width, height) = self.input_size();
        [1, height as usize, width as usize, 3]
    }

    fn ensure_class_index(&self, class_index: usize) -> Result<(), Error>
    {
        let num_classes = self.labels().len();
        if class_index >= num_classes
        {
            return Err(Error::ClassIndexOutOfRange { index: class_index, num_classes });
        }
        Ok(())
    }

    fn ensure_input_shape(&self, input: &Array4<f32>) -> Result<(), Error>
    {
        let expected = self.expected_shape();
        if input.shape() != expected
        {
            return Err(Error::InputShapeMismatch {
                expected,
                actual: input.shape().to_vec(),
            });
        }
        Ok(())
    }
}

/// The MRI tumor classifier, backed by ONNX Runtime.
///
/// Holds one session per exported graph: the probability head, and an
/// optional companion graph that computes d(score[class]) / d(input).
/// ONNX Runtime does not differentiate graphs at runtime, so the gradient
/// is baked into the companion graph when the trained model is converted
/// offline; at runtime both graphs are plain inference calls. A classifier
/// constructed without the companion graph still predicts, but reports the
/// gradient capability as unsupported.
///
/// Sessions sit behind mutexes because running one takes `&mut`; this
/// design is one synchronous analysis at a time, so the locks are never
/// contended.
///
/// The reference models are Keras-exported, which is why the input layout
/// is NHWC rather than the NCHW most torch exports use.
// TODO Support NCHW exports as well; the converter currently always emits NHWC.
pub struct OnnxClassifier
{
    scores_session: Mutex<Session>,
    gradient_session: Option<Mutex<Session>>,
    labels: Vec<String>,
    input_size: (u32, u32),
}

impl OnnxClassifier
{
    pub fn new(
        model_path: &Path,
        gradient_model_path: Option<&Path>,
        labels: Vec<String>,
        input_size: (u32, u32),
    ) -> Result<Self, ort::Error>
    {
        let scores_session = Self::build_session(model_path)?;

        let gradient_session = match gradient_model_path
        {
            Some(path) => Some(Mutex::new(Self::build_session(path)?)),
            None => None,
        };

        Ok(OnnxClassifier {
            scores_session: Mutex::new(scores_session),
            gradient_session,
            labels,
            input_size,
        })
    }

    fn build_session(model_path: &Path) -> Result<Session, ort::Error>
    {
        Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .commit_from_file(model_path)
    }
}

impl Classifier for OnnxClassifier
{
    fn labels(&self) -> &[String]
    {
        &self.labels
    }

    fn input_size(&self) -> (u32, u32)
    {
        self.input_size
    }

    /// Runs the probability head on a single-image batch.
    ///
    /// Returns the distribution over `labels()`; the graph applies its own
    /// softmax, so the values already sum to one.
    fn predict(&self, input: &Array4<f32>) -> Result<Array1<f32>, Error>
    {
        self.ensure_input_shape(input)?;

        let image = Tensor::from_array(input.clone())?;

        let mut session = self
            .scores_session
            .lock()
            .map_err(|_| anyhow::anyhow!("Classifier session lock poisoned"))?;
        let outputs = session.run(ort::inputs![image])?;

        // Shape [1, num_classes]; one image per batch in this design.
        let output = outputs["PROBABILITIES"].try_extract_array::<f32>()?;
        let probabilities = output.to_shape(self.labels.len())?.to_owned();

        Ok(probabilities)
    }

    /// Runs the companion gradient graph for the given class.
    ///
    /// The graph takes the image batch plus the class index and returns the
    /// gradient of that class's score with respect to the input, in the
    /// same NHWC shape as the input.
    fn class_gradient(&self, input: &Array4<f32>, class_index: usize) -> Result<Array4<f32>, Error>
    {
        self.ensure_class_index(class_index)?;
        self.ensure_input_shape(input)?;

        let session = self.gradient_session.as_ref().ok_or(Error::GradientUnsupported)?;

        let image = Tensor::from_array(input.clone())?;
        let class = Tensor::from_array(Array::from_elem(1, class_index as i64))?;

        let mut session = session
            .lock()
            .map_err(|_| anyhow::anyhow!("Gradient session lock poisoned"))?;
        let outputs = session.run(ort::inputs![image, class])?;

        let output = outputs["CLASS_GRADIENTS"].try_extract_array::<f32>()?;
        let (width, height) = self.input_size;
        let gradients = output
            .to_shape((1, height as usize, width as usize, 3))?
            .to_owned();

        Ok(gradients)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use ndarray::Array4;

    struct ShapeOnly;

    impl Classifier for ShapeOnly
    {
        fn labels(&self) -> &[String]
        {
            static LABELS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
            LABELS.get_or_init(|| vec!["a".to_string(), "b".to_string()])
        }

        fn input_size(&self) -> (u32, u32)
        {
            (8, 6)
        }

        fn predict(&self, _input: &Array4<f32>) -> Result<Array1<f32>, Error>
        {
            unimplemented!("shape helpers only")
        }

        fn class_gradient(&self, _input: &Array4<f32>, _class_index: usize) -> Result<Array4<f32>, Error>
        {
            unimplemented!("shape helpers only")
        }
    }

    #[test]
    fn expected_shape_is_nhwc()
    {
        assert_eq!(ShapeOnly.expected_shape(), [1, 6, 8, 3]);
    }

    #[test]
    fn class_index_bounds_are_checked()
    {
        assert!(ShapeOnly.ensure_class_index(1).is_ok());
        let err = ShapeOnly.ensure_class_index(2).unwrap_err();
        assert!(matches!(err, Error::ClassIndexOutOfRange { index: 2, num_classes: 2 }));
    }

    #[test]
    fn mismatched_input_shape_is_rejected()
    {
        let input = Array4::<f32>::zeros((1, 6, 6, 3));
        let err = ShapeOnly.ensure_input_shape(&input).unwrap_err();
        assert!(matches!(err, Error::InputShapeMismatch { .. }));

        let input = Array4::<f32>::zeros((1, 6, 8, 3));
        assert!(ShapeOnly.ensure_input_shape(&input).is_ok());
    }
}
