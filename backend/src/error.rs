use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::model::InferenceError;
use crate::preprocess::PreprocessError;

/// Everything that can end a prediction request early.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("file is required")]
    MissingFile,
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    UnsupportedFormat(String),
    #[error("file too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("invalid upload: {0}")]
    Multipart(String),
    #[error("prediction failed: {0}")]
    Inference(#[from] InferenceError),
}

impl From<PreprocessError> for ServiceError {
    fn from(err: PreprocessError) -> Self {
        match err {
            PreprocessError::Decode(_) => ServiceError::Decode(err.to_string()),
            PreprocessError::UnsupportedFormat(_) => ServiceError::UnsupportedFormat(err.to_string()),
        }
    }
}

impl From<actix_multipart::MultipartError> for ServiceError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        ServiceError::Multipart(err.to_string())
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::MissingFile | ServiceError::Decode(_) | ServiceError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ServiceError::MissingFile.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::from(PreprocessError::Decode("bad".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::from(PreprocessError::UnsupportedFormat("Gif".into())).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            ServiceError::PayloadTooLarge { limit: 10 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ServiceError::from(InferenceError::EmptyOutput).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::from(InferenceError::NoComparableScore(11)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_file_message() {
        assert_eq!(ServiceError::MissingFile.to_string(), "file is required");
    }
}
