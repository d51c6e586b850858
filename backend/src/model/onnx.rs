use ndarray::Array4;
use std::path::Path;
use tract_onnx::prelude::*;

use super::{Classifier, InferenceError, ModelLoadError, file_name, softmax};
use crate::config::{ImageConfig, ModelConfig};

type Plan = TypedRunnableModel<TypedModel>;

/// ONNX classifier run through tract.
///
/// The graph is pinned to a `(1, height, width, 3)` f32 input and optimized
/// once at load time. `SimplePlan::run` takes `&self`, so requests share the
/// plan without a lock.
pub struct OnnxClassifier {
    plan: Plan,
    name: String,
    input_shape: [usize; 4],
    apply_softmax: bool,
}

impl OnnxClassifier {
    pub fn load(
        path: &Path,
        image: &ImageConfig,
        model: &ModelConfig,
    ) -> Result<Self, ModelLoadError> {
        let input_shape = [1, image.height() as usize, image.width() as usize, 3];
        let malformed = |e: TractError| ModelLoadError::Malformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(malformed)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(
                    input_shape[0],
                    input_shape[1],
                    input_shape[2],
                    input_shape[3]
                )),
            )
            .map_err(malformed)?
            .into_optimized()
            .map_err(malformed)?
            .into_runnable()
            .map_err(malformed)?;

        log::info!(
            "Loaded ONNX model {} with input shape {:?}",
            path.display(),
            input_shape
        );

        Ok(Self {
            plan,
            name: file_name(path),
            input_shape,
            apply_softmax: model.apply_softmax,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        if input.shape() != self.input_shape {
            return Err(InferenceError::Backend(format!(
                "expected input shape {:?}, got {:?}",
                self.input_shape,
                input.shape()
            )));
        }

        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_shape(&self.input_shape, &data)
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::Backend(e.to_string()))?;

        let first = outputs.first().ok_or(InferenceError::EmptyOutput)?;
        let scores = first
            .as_slice::<f32>()
            .map_err(|e| InferenceError::Backend(e.to_string()))?
            .to_vec();

        if scores.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        Ok(if self.apply_softmax { softmax(&scores) } else { scores })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
