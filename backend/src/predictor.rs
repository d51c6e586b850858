use ndarray::Array4;
use shared::PredictionResponse;
use std::sync::Arc;

use crate::config::ImageConfig;
use crate::error::ServiceError;
use crate::model::{Classifier, InferenceError};
use crate::preprocess::preprocess;

/// Ordered class names. Position `i` names entry `i` of the model output.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable(Vec<String>);

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self(labels)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Falls back to `"Class {index}"` when the model has more outputs than
    /// there are labels.
    pub fn label_for(&self, index: usize) -> String {
        self.0
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Class {}", index))
    }
}

/// Index of the largest value, first occurrence on ties. NaN never wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if v <= current => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub index: usize,
    pub probs: Vec<f32>,
}

impl Prediction {
    pub fn into_response(self, labels: &LabelTable) -> PredictionResponse {
        PredictionResponse {
            label: self.label,
            index: self.index,
            probs: self.probs,
            classes: labels.names().to_vec(),
        }
    }
}

/// The read-only state every request shares: model, labels and input size.
#[derive(Clone)]
pub struct Predictor {
    classifier: Arc<dyn Classifier>,
    labels: Arc<LabelTable>,
    image: Arc<ImageConfig>,
}

impl Predictor {
    pub fn new(classifier: Arc<dyn Classifier>, labels: LabelTable, image: ImageConfig) -> Self {
        Self {
            classifier,
            labels: Arc::new(labels),
            image: Arc::new(image),
        }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn predict_image(&self, image_data: &[u8]) -> Result<Prediction, ServiceError> {
        let tensor = preprocess(image_data, &self.image)?;
        self.predict_tensor(&tensor)
    }

    pub fn predict_tensor(&self, tensor: &Array4<f32>) -> Result<Prediction, ServiceError> {
        let probs = self.classifier.predict(tensor)?;
        let index = argmax(&probs).ok_or(if probs.is_empty() {
            InferenceError::EmptyOutput
        } else {
            InferenceError::NoComparableScore(probs.len())
        })?;

        if probs.len() != self.labels.len() {
            log::warn!(
                "Model {} returned {} scores but {} labels are configured",
                self.classifier.name(),
                probs.len(),
                self.labels.len()
            );
        }

        Ok(Prediction {
            label: self.labels.label_for(index),
            index,
            probs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::model::testing::{BrokenClassifier, FakeClassifier, FixedClassifier};
    use crate::preprocess::tests::black_png;

    fn default_labels() -> LabelTable {
        LabelTable::new(ClassifierConfig::default().labels)
    }

    fn predictor(classifier: Arc<dyn Classifier>) -> Predictor {
        Predictor::new(classifier, default_labels(), ImageConfig::default())
    }

    #[test]
    fn argmax_picks_largest() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some(1));
        assert_eq!(argmax(&[0.5]), Some(0));
    }

    #[test]
    fn argmax_ties_go_to_lowest_index() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4, 0.0]), Some(1));
        assert_eq!(argmax(&[0.25, 0.25, 0.25, 0.25]), Some(0));
    }

    #[test]
    fn argmax_skips_nan() {
        assert_eq!(argmax(&[f32::NAN, 0.1, 0.3]), Some(2));
        assert_eq!(argmax(&[f32::NAN, f32::NAN]), None);
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn label_lookup_and_fallback() {
        let labels = default_labels();
        assert_eq!(labels.len(), 11);
        assert_eq!(labels.label_for(0), "Water");
        assert_eq!(labels.label_for(10), "Fighting");
        assert_eq!(labels.label_for(11), "Class 11");
    }

    #[test]
    fn black_image_end_to_end() {
        let mut probs = vec![0.05; 11];
        probs[2] = 0.5;
        let predictor = predictor(Arc::new(FixedClassifier(probs.clone())));

        let prediction = predictor.predict_image(&black_png(300, 300)).unwrap();
        assert_eq!(prediction.index, 2);
        assert_eq!(prediction.label, "Fire");

        let response = prediction.into_response(predictor.labels());
        assert_eq!(response.classes.len(), 11);
        assert_eq!(response.probs, probs);
    }

    #[test]
    fn extra_model_outputs_get_generic_label() {
        let mut probs = vec![0.0; 13];
        probs[12] = 1.0;
        let predictor = predictor(Arc::new(FixedClassifier(probs)));
        let prediction = predictor.predict_image(&black_png(10, 10)).unwrap();
        assert_eq!(prediction.index, 12);
        assert_eq!(prediction.label, "Class 12");
    }

    #[test]
    fn index_is_always_in_bounds() {
        let predictor = predictor(Arc::new(FakeClassifier::new(11)));
        for size in [1, 7, 120, 333] {
            let prediction = predictor.predict_image(&black_png(size, size)).unwrap();
            assert!(prediction.index < prediction.probs.len());
            assert_eq!(prediction.probs.len(), 11);
        }
    }

    #[test]
    fn repeated_prediction_is_identical() {
        let predictor = predictor(Arc::new(FakeClassifier::new(11)));
        let bytes = black_png(64, 48);
        assert_eq!(
            predictor.predict_image(&bytes).unwrap(),
            predictor.predict_image(&bytes).unwrap()
        );
    }

    #[test]
    fn empty_output_is_an_inference_error() {
        let predictor = predictor(Arc::new(FixedClassifier(Vec::new())));
        let err = predictor.predict_image(&black_png(4, 4)).unwrap_err();
        assert!(matches!(err, ServiceError::Inference(InferenceError::EmptyOutput)));
    }

    #[test]
    fn all_nan_output_is_not_reported_as_empty() {
        let predictor = predictor(Arc::new(FixedClassifier(vec![f32::NAN; 11])));
        let err = predictor.predict_image(&black_png(4, 4)).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Inference(InferenceError::NoComparableScore(11))
        ));
        assert!(err.to_string().contains("NaN"));
    }

    #[test]
    fn backend_failure_propagates() {
        let predictor = predictor(Arc::new(BrokenClassifier));
        let err = predictor.predict_image(&black_png(4, 4)).unwrap_err();
        assert!(matches!(err, ServiceError::Inference(InferenceError::Backend(_))));
    }

    #[test]
    fn undecodable_bytes_never_reach_the_model() {
        let classifier = Arc::new(FakeClassifier::new(11));
        let predictor = predictor(classifier.clone());
        let err = predictor.predict_image(b"hello").unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
        assert_eq!(classifier.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
