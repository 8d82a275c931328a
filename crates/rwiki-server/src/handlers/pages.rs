//! Site pages and resources.
//!
//! Every path outside `/api` is resolved by the engine: rendered pages come
//! back as HTML with an `ETag`, other files are streamed from the extracted
//! sources with a guessed content type.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Response};
use md5::{Digest, Md5};
use percent_encoding::percent_decode_str;
use rwiki_site::RenderResult;

use crate::error::ServerError;
use crate::state::AppState;

/// Handle GET/HEAD for any non-API path.
pub(crate) async fn render_path(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(ServerError::MethodNotAllowed);
    }
    let path = decode_path(uri.path())?;

    match state.engine.render(&path).await? {
        RenderResult::Content(html) => Ok(page_response(&state.version, &html, &headers)),
        RenderResult::RawResource(resource) => {
            let bytes = resource.read().await?;
            let mime = mime_for(resource.path());
            Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
        }
        RenderResult::NotFound(path) => Err(ServerError::NotFound(path)),
        RenderResult::NotReady => Err(ServerError::NotReady),
    }
}

fn page_response(version: &str, html: &str, headers: &HeaderMap) -> Response {
    let etag = compute_etag(version, html);

    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && if_none_match.as_bytes() == etag.as_bytes()
    {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    (
        [
            (header::ETAG, etag),
            (header::CACHE_CONTROL, "no-cache".to_owned()),
        ],
        Html(html.to_owned()),
    )
        .into_response()
}

/// Compute `ETag` from version and content.
///
/// MD5 truncated to 64 bits (16 hex chars).
fn compute_etag(version: &str, content: &str) -> String {
    let hash = Md5::digest(format!("{version}:{content}").as_bytes());
    format!("\"{}\"", &hex::encode(hash)[..16])
}

fn decode_path(raw: &str) -> Result<String, ServerError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| ServerError::BadPath(raw.to_owned()))
}

fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}
