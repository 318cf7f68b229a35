use axum::{
    Router,
    body::Body,
    extract::{Path, Query},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::{
    Config,
    model::ResourceType,
    services::storage,
    utils::uploads::{get_uploads_dir, resolve_under},
    web::{AppState, WebError, WebResult, error::ErrorResponse},
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SignedQuery {
    /// Unix timestamp the link stops working at.
    pub expires: i64,
    pub signature: String,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/{*path}", get(files_get_handler))
        .with_state(state)
}

fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("mp4") => "video/mp4",
        Some("txt" | "md") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{path}",
    description = "Serves an uploaded file through a link issued by the lesson material endpoint",
    params(
        ("path" = String, Path, description = "Path under the uploads directory"),
        SignedQuery,
    ),
    responses(
        (status = 200, description = "File contents"),
        (status = 400, description = "Path is not allowed", body = ErrorResponse),
        (status = 403, description = "Signature invalid or expired", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
    ),
    tag = "files"
)]
async fn files_get_handler(
    Path(path): Path<String>,
    Query(query): Query<SignedQuery>,
) -> WebResult<impl IntoResponse> {
    let rt = ResourceType::File;
    let key = Config::get_or_init(false).await.app().storage_key();

    if !storage::verify_path(key, &path, query.expires, &query.signature, Utc::now()) {
        return Err(WebError::resource_forbidden(rt));
    }

    let root = get_uploads_dir().map_err(WebError::server_io_error)?;
    let full = resolve_under(&root, &path)
        .ok_or_else(|| WebError::resource_bad_request(rt, "path is not allowed"))?;

    let file = match tokio::fs::File::open(&full).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WebError::resource_not_found(rt));
        }
        Err(e) => return Err(WebError::server_io_error(e)),
    };

    let is_file = file.metadata().await.is_ok_and(|m| m.is_file());
    if !is_file {
        return Err(WebError::resource_not_found(rt));
    }

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type(&path))], body))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type("lessons/intro.PDF"), "application/pdf");
        assert_eq!(content_type("a/b/c"), "application/octet-stream");
        assert_eq!(content_type("clip.mp4"), "video/mp4");
    }
}
