use ndarray::Array4;
use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor};

use super::{Classifier, InferenceError, ModelLoadError, file_name};
use crate::config::{ImageConfig, ModelConfig};

/// TorchScript classifier. The exported module must accept NHWC input.
pub struct TorchClassifier {
    model: Mutex<CModule>,
    device: Device,
    name: String,
    apply_softmax: bool,
}

impl TorchClassifier {
    pub fn load(
        path: &Path,
        _image: &ImageConfig,
        model: &ModelConfig,
    ) -> Result<Self, ModelLoadError> {
        let device = Device::cuda_if_available();
        let mut module =
            CModule::load_on_device(path, device).map_err(|e| ModelLoadError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        module.set_eval();

        log::info!("Loaded TorchScript model {} on {:?}", path.display(), device);

        Ok(Self {
            model: Mutex::new(module),
            device,
            name: file_name(path),
            apply_softmax: model.apply_softmax,
        })
    }
}

impl Classifier for TorchClassifier {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_slice(&data).view(shape.as_slice()).to_device(self.device);

        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| InferenceError::Backend("model lock poisoned".into()))?;
            tch::no_grad(|| model.forward_ts(&[tensor]))
                .map_err(|e| InferenceError::Backend(e.to_string()))?
        };

        let output = if self.apply_softmax {
            output.softmax(-1, Kind::Float)
        } else {
            output
        };
        let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
        let num_elements = output_flat.size()[0] as usize;
        if num_elements == 0 {
            return Err(InferenceError::EmptyOutput);
        }
        let mut output_vec = vec![0.0f32; num_elements];
        output_flat.copy_data(&mut output_vec, num_elements);
        Ok(output_vec)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
