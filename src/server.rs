use actix_cors::Cors;
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use futures::TryStreamExt;

use crate::{
    config::{Config, CORS_ALLOWED_ORIGINS, MAX_IMAGE_BYTES},
    error::{AppError, Result},
    models::{GenerationRequest, ImageUpload, DEFAULT_STYLE},
    pipeline::Orchestrator,
};

/// Cap for the plain text form fields.
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/generate", web::post().to(generate));
}

pub fn cors() -> Cors {
    CORS_ALLOWED_ORIGINS
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
}

pub async fn run(config: &Config, orchestrator: Orchestrator) -> std::io::Result<()> {
    let state = web::Data::new(orchestrator);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors())
            .wrap(middleware::Logger::new("%r %s %Dms"))
            .configure(configure)
    })
    .bind((config.host(), config.port()))?
    .run()
    .await
}

async fn generate(
    orchestrator: web::Data<Orchestrator>,
    payload: Multipart,
) -> std::result::Result<HttpResponse, AppError> {
    let request = read_form(payload).await?;
    let result = orchestrator.handle(request).await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn read_form(mut payload: Multipart) -> Result<GenerationRequest> {
    let mut prompt = String::new();
    let mut style = DEFAULT_STYLE.to_string();
    let mut api_key = String::new();
    let mut image = None;

    while let Some(field) = payload.try_next().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prompt" => prompt = read_text(field, "prompt").await?,
            "style" => style = read_text(field, "style").await?,
            "api_key" => api_key = read_text(field, "api_key").await?,
            "image" => image = read_image(field).await?,
            _ => drain(field).await?,
        }
    }

    Ok(GenerationRequest {
        prompt,
        image,
        style,
        credential: api_key,
    })
}

async fn read_text(mut field: Field, name: &str) -> Result<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(malformed)? {
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(AppError::client_input(format!("{} is too long", name)));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes)
        .map_err(|_| AppError::client_input(format!("{} must be valid UTF-8", name)))
}

/// Keeps at most one byte past the ceiling so the size check can still fire.
async fn read_image(mut field: Field) -> Result<Option<ImageUpload>> {
    let mime_type = field
        .content_type()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_default();
    let has_filename = field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .map_or(false, |f| !f.is_empty());

    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(malformed)? {
        let room = (MAX_IMAGE_BYTES + 1).saturating_sub(data.len());
        data.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    if data.is_empty() && !has_filename {
        return Ok(None);
    }
    Ok(Some(ImageUpload { mime_type, data }))
}

async fn drain(mut field: Field) -> Result<()> {
    while field.try_next().await.map_err(malformed)?.is_some() {}
    Ok(())
}

fn malformed(e: MultipartError) -> AppError {
    AppError::client_input(format!("malformed multipart body: {}", e))
}
