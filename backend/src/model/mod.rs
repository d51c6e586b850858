mod onnx;
#[cfg(feature = "torch")]
mod torch;

use ndarray::Array4;
use std::path::Path;
use std::sync::Arc;

use crate::config::{ImageConfig, ModelConfig};

pub use onnx::OnnxClassifier;
#[cfg(feature = "torch")]
pub use torch::TorchClassifier;

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Model file not found: {0}")]
    NotFound(String),
    #[error("Model file {path} could not be loaded: {reason}")]
    Malformed { path: String, reason: String },
    #[error("No backend compiled in for model file {0}")]
    UnsupportedBackend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Model backend error: {0}")]
    Backend(String),
    #[error("Model returned an empty probability vector")]
    EmptyOutput,
    #[error("Model returned {0} scores and all of them are NaN")]
    NoComparableScore(usize),
}

/// A pre-trained image classifier.
///
/// Input is a `(1, height, width, 3)` batch; output is one score per class.
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;

    /// Short name used in logs and on the index page.
    fn name(&self) -> &str;
}

/// Loads the classifier at `path`, picking the backend from the extension.
pub fn load(
    path: &Path,
    image: &ImageConfig,
    model: &ModelConfig,
) -> Result<Arc<dyn Classifier>, ModelLoadError> {
    if !path.is_file() {
        return Err(ModelLoadError::NotFound(path.display().to_string()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pt" | "pth") => load_torch(path, image, model),
        _ => Ok(Arc::new(OnnxClassifier::load(path, image, model)?)),
    }
}

#[cfg(feature = "torch")]
fn load_torch(
    path: &Path,
    image: &ImageConfig,
    model: &ModelConfig,
) -> Result<Arc<dyn Classifier>, ModelLoadError> {
    Ok(Arc::new(TorchClassifier::load(path, image, model)?))
}

#[cfg(not(feature = "torch"))]
fn load_torch(
    path: &Path,
    _image: &ImageConfig,
    _model: &ModelConfig,
) -> Result<Arc<dyn Classifier>, ModelLoadError> {
    Err(ModelLoadError::UnsupportedBackend(format!(
        "{} (rebuild with --features torch)",
        path.display()
    )))
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Numerically stable softmax, for models exported without a softmax head.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", uuid::Uuid::new_v4(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_model_is_not_found() {
        let err = load(
            Path::new("/nonexistent/pokemon_cnn.onnx"),
            &ImageConfig::default(),
            &ModelConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ModelLoadError::NotFound(_)));
    }

    #[test]
    fn garbage_model_is_malformed() {
        let path = scratch_file("garbage.onnx", b"this is not a protobuf graph");
        let err = load(&path, &ImageConfig::default(), &ModelConfig::default())
            .err()
            .unwrap();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, ModelLoadError::Malformed { .. }));
    }

    #[cfg(not(feature = "torch"))]
    #[test]
    fn torchscript_needs_the_torch_feature() {
        let path = scratch_file("model.pt", b"not really torchscript");
        let err = load(&path, &ImageConfig::default(), &ModelConfig::default())
            .err()
            .unwrap();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, ModelLoadError::UnsupportedBackend(_)));
    }

    #[test]
    fn softmax_sums_to_one_and_keeps_order() {
        let probs = softmax(&[1.0, 3.0, 2.0, 1000.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[3] > probs[1] && probs[1] > probs[2] && probs[2] > probs[0]);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn file_name_strips_directories() {
        assert_eq!(file_name(Path::new("/models/pokemon_cnn.onnx")), "pokemon_cnn.onnx");
    }
}
