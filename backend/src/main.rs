mod config;
mod error;
mod model;
mod page;
mod predictor;
mod preprocess;
mod routes;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use config::AppConfig;
use predictor::{LabelTable, Predictor};
use routes::{UploadLimit, configure_routes};
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let classifier = model::load(
        &config.model_path,
        &config.classifier.image,
        &config.classifier.model,
    )
    .map_err(|e| {
        log::error!("Failed to load model at startup: {}", e);
        std::io::Error::other(format!("Model loading failed: {}", e))
    })?;

    let labels = LabelTable::new(config.classifier.labels.clone());
    log::info!(
        "Serving {} with {} classes, input {}x{}",
        classifier.name(),
        labels.len(),
        config.classifier.image.width(),
        config.classifier.image.height()
    );

    let predictor = Predictor::new(classifier, labels, config.classifier.image.clone());
    let upload_limit = UploadLimit(config.max_upload_bytes);
    let static_dir = config.static_dir.clone();
    let bind_address = config.bind_address();

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(predictor.clone()))
            .app_data(web::Data::new(upload_limit))
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
