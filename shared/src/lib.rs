use serde::{Deserialize, Serialize};

/// Body of a successful `/api/predict` call.
///
/// `probs[i]` is the probability of `classes[i]`; `index` points into both.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResponse {
    pub label: String,
    pub index: usize,
    pub probs: Vec<f32>,
    pub classes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub classes: usize,
}
