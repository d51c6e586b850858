use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::http::header::ContentType;
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use futures::TryStreamExt;
use log::{info, warn};
use shared::HealthResponse;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::model::InferenceError;
use crate::page::PageView;
use crate::predictor::{Prediction, Predictor};

/// Largest accepted `file` field, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

struct Upload {
    file_name: Option<String>,
    data: Vec<u8>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: PathBuf) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/predict").route(web::post().to(predict_page)))
        .service(web::resource("/api/predict").route(web::post().to(api_predict)))
        .service(web::resource("/api/health").route(web::get().to(health)))
        .service(Files::new("/static", static_dir));
}

async fn index(predictor: web::Data<Predictor>) -> HttpResponse {
    let page = PageView::new(predictor.labels(), predictor.model_name()).render();
    HttpResponse::Ok().content_type(ContentType::html()).body(page)
}

async fn health(predictor: web::Data<Predictor>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".into(),
        model: predictor.model_name().to_string(),
        classes: predictor.labels().len(),
    })
}

async fn api_predict(
    req: HttpRequest,
    payload: web::Payload,
    predictor: web::Data<Predictor>,
    limit: web::Data<UploadLimit>,
) -> Result<HttpResponse, ServiceError> {
    let request_id = Uuid::new_v4();
    let upload = read_upload(Multipart::new(req.headers(), payload), limit.0)
        .await
        .inspect_err(|e| warn!("[{}] Rejected upload: {}", request_id, e))?;

    let prediction = run_prediction(&predictor, upload, request_id).await?;
    Ok(HttpResponse::Ok().json(prediction.into_response(predictor.labels())))
}

/// Form fallback for clients without JavaScript. A missing file just shows
/// the page again; other failures are shown inline with their status code.
async fn predict_page(
    req: HttpRequest,
    payload: web::Payload,
    predictor: web::Data<Predictor>,
    limit: web::Data<UploadLimit>,
) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let outcome = match read_upload(Multipart::new(req.headers(), payload), limit.0).await {
        Ok(upload) => run_prediction(&predictor, upload, request_id).await,
        Err(e) => Err(e),
    };

    let view = PageView::new(predictor.labels(), predictor.model_name());
    let (status, page) = match outcome {
        Ok(prediction) => (StatusCode::OK, view.with_prediction(&prediction).render()),
        Err(ServiceError::MissingFile) => (StatusCode::OK, view.render()),
        Err(err) => {
            warn!("[{}] Page prediction failed: {}", request_id, err);
            let message = err.to_string();
            (err.status_code(), view.with_error(&message).render())
        }
    };

    HttpResponse::build(status)
        .content_type(ContentType::html())
        .body(page)
}

/// Reads the first `file` field. Other fields are skipped.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Upload, ServiceError> {
    let mut upload: Option<Upload> = None;

    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some("file") || upload.is_some() {
            while field.try_next().await?.is_some() {}
            continue;
        }

        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_owned);

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if data.len() + chunk.len() > limit {
                return Err(ServiceError::PayloadTooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }
        upload = Some(Upload { file_name, data });
    }

    match upload {
        Some(upload) if !upload.data.is_empty() => Ok(upload),
        _ => Err(ServiceError::MissingFile),
    }
}

/// Inference is CPU bound, so it runs on the blocking pool.
async fn run_prediction(
    predictor: &Predictor,
    upload: Upload,
    request_id: Uuid,
) -> Result<Prediction, ServiceError> {
    let file_name = upload.file_name.unwrap_or_else(|| "<unnamed>".into());
    let size = upload.data.len();

    let worker = predictor.clone();
    let data = upload.data;
    let result = web::block(move || worker.predict_image(&data))
        .await
        .map_err(|e| ServiceError::Inference(InferenceError::Backend(e.to_string())))?;

    match &result {
        Ok(prediction) => info!(
            "[{}] {} ({} bytes) -> {} (index {})",
            request_id, file_name, size, prediction.label, prediction.index
        ),
        Err(e) => warn!("[{}] {} ({} bytes) failed: {}", request_id, file_name, size, e),
    }
    result
}
