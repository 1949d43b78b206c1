use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::io::ReaderStream;

use crate::db::posts;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::sanitize_filename;

const OCTET_STREAM: &str = "application/octet-stream";

pub fn router() -> Router<AppState> {
    Router::new().route("/attachments/{id}", get(download))
}

/// GET /attachments/{id} — stream an attachment's bytes
async fn download(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id: i64 = id.parse().map_err(|_| AppError::NotFound)?;

    let attachment = {
        let conn = state.db.get()?;
        posts::find_attachment(&conn, id)?.ok_or(AppError::NotFound)?
    };

    let post_dir = state.files.post_dir(attachment.post_id);
    match tokio::fs::metadata(&post_dir).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return Err(AppError::NotFound),
    }

    let path = match attachment.stored_name.as_deref() {
        Some(stored_name) => state.files.resolve(attachment.post_id, stored_name).await,
        None => {
            state
                .files
                .find_by_original_name(attachment.post_id, &attachment.name)
                .await?
        }
    };
    let Some(path) = path else {
        tracing::debug!("Attachment {} has no file on disk", id);
        return Err(AppError::NotFound);
    };

    let file = tokio::fs::File::open(&path).await?;
    let length = file.metadata().await?.len();

    let content_type = if attachment.mime_type.trim().is_empty() {
        OCTET_STREAM.to_string()
    } else {
        attachment.mime_type
    };
    let disposition = format!(
        "inline; filename=\"{}\"",
        sanitize_filename(&attachment.name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, length.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}
