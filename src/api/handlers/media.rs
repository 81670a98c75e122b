//! Media fileserver handler.

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};

use crate::api::state::AppState;
use crate::error::Result;

/// Serve an object.
///
/// Redirects to a presigned URL when the driver can produce one, otherwise
/// reads the object and returns it directly.
pub async fn serve(State(state): State<AppState>, Path(key): Path<String>) -> Result<Response> {
    let cancel = state.shutdown.child_token();

    if let Some(url) = state.driver.url(&key, &cancel).await {
        return Ok(Redirect::temporary(url.as_str()).into_response());
    }

    let data = state.driver.get(&key).await?;

    let content_type = mime_guess::from_path(&key).first_or_octet_stream();
    let content_type = HeaderValue::from_str(content_type.as_ref())
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], data).into_response())
}
