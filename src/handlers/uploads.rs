use crate::{
    auth::AdminUser,
    errors::ServiceError,
    services::uploads::{MediaKind, StoredFile},
    AppState,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};

/// Multipart bodies may carry whole albums; the service still enforces the
/// configured per-file cap.
const MAX_UPLOAD_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Creates the router for admin media uploads
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/image", post(upload_image))
        .route("/audio-preview", post(upload_audio_preview))
        .route("/audio-file", post(upload_audio_file))
        .route("/multiple-audio-files", post(upload_multiple_audio_files))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES))
}

async fn upload_image(
    State(state): State<AppState>,
    _admin: AdminUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    single_upload(&state, MediaKind::Image, multipart).await
}

async fn upload_audio_preview(
    State(state): State<AppState>,
    _admin: AdminUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    single_upload(&state, MediaKind::AudioPreview, multipart).await
}

async fn upload_audio_file(
    State(state): State<AppState>,
    _admin: AdminUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    single_upload(&state, MediaKind::AudioFile, multipart).await
}

/// Store the first file part of the request and return its public URL
async fn single_upload(
    state: &AppState,
    kind: MediaKind,
    mut multipart: Multipart,
) -> Result<Json<StoredFile>, ServiceError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.file_name().is_none() {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ServiceError::BadRequest(format!("reading upload: {}", e)))?;

        let stored = state
            .services
            .uploads
            .store(kind, file_name.as_deref(), content_type.as_deref(), data)
            .await?;
        return Ok(Json(stored));
    }

    Err(ServiceError::ValidationError(
        "no file found in request".to_string(),
    ))
}

/// Store every file part of the request (album track upload)
async fn upload_multiple_audio_files(
    State(state): State<AppState>,
    _admin: AdminUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.file_name().is_none() {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ServiceError::BadRequest(format!("reading upload: {}", e)))?;

        let stored = state
            .services
            .uploads
            .store(
                MediaKind::AudioFile,
                file_name.as_deref(),
                content_type.as_deref(),
                data,
            )
            .await?;
        files.push(stored);
    }

    if files.is_empty() {
        return Err(ServiceError::ValidationError(
            "no files found in request".to_string(),
        ));
    }

    Ok(Json(serde_json::json!({ "files": files })))
}
