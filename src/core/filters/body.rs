//! Whole-body rewrites and request size limits.
use axum::{body::Body, response::IntoResponse};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{
    HeaderMap, Request, Response, StatusCode,
    header::{CONTENT_LENGTH, HeaderValue, TRANSFER_ENCODING},
};

use super::{FilterError, SettingsReader};
use crate::core::chain::Next;

/// Literal substring replacement over a UTF-8 body. Non-UTF-8 bodies pass unchanged.
#[derive(Debug, Clone)]
struct Replacement {
    from: String,
    to: String,
}

impl Replacement {
    fn read(reader: &mut SettingsReader<'_>) -> Self {
        Self {
            from: reader.required_string("from"),
            to: reader.string_or("to", ""),
        }
    }

    fn is_noop(&self) -> bool {
        self.from.is_empty()
    }

    fn apply(&self, body: Bytes) -> Bytes {
        match std::str::from_utf8(&body) {
            Ok(text) if text.contains(self.from.as_str()) => {
                Bytes::from(text.replace(self.from.as_str(), &self.to))
            }
            _ => body,
        }
    }
}

fn set_length(headers: &mut HeaderMap, len: usize) {
    headers.remove(TRANSFER_ENCODING);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
}

#[derive(Debug)]
pub struct ModifyRequestBodyFilter {
    replacement: Replacement,
}

impl ModifyRequestBodyFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        Self {
            replacement: Replacement::read(reader),
        }
    }

    pub(super) async fn apply(&self, req: Request<Body>, next: Next<'_>) -> Response<Body> {
        if self.replacement.is_noop() {
            return next.run(req).await;
        }
        let (mut parts, body) = req.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read request body");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read request body")
                    .into_response();
            }
        };
        let bytes = self.replacement.apply(bytes);
        set_length(&mut parts.headers, bytes.len());
        next.run(Request::from_parts(parts, Body::from(bytes))).await
    }
}

/// Response-side counterpart of [`ModifyRequestBodyFilter`]; acts only as a response hook.
#[derive(Debug)]
pub struct ModifyResponseBodyFilter {
    replacement: Replacement,
}

impl ModifyResponseBodyFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        Self {
            replacement: Replacement::read(reader),
        }
    }

    pub(super) async fn apply_response(
        &self,
        response: Response<Body>,
    ) -> Result<Response<Body>, FilterError> {
        if self.replacement.is_noop() {
            return Ok(response);
        }
        let (mut parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|e| FilterError::Body(e.to_string()))?
            .to_bytes();
        let bytes = self.replacement.apply(bytes);
        set_length(&mut parts.headers, bytes.len());
        Ok(Response::from_parts(parts, Body::from(bytes)))
    }
}

/// Rejects requests whose declared `Content-Length` exceeds `max_size` bytes.
#[derive(Debug)]
pub struct RequestSizeFilter {
    max_size: u64,
}

impl RequestSizeFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        Self {
            max_size: reader.u64_or("max_size", 0),
        }
    }

    pub(super) async fn apply(&self, req: Request<Body>, next: Next<'_>) -> Response<Body> {
        if self.max_size == 0 {
            return next.run(req).await;
        }
        let declared = req.headers().get(CONTENT_LENGTH).map(|v| {
            v.to_str()
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
        });
        match declared {
            None => {
                tracing::debug!("No Content-Length, skipping size check");
            }
            Some(None) => {
                return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
            }
            Some(Some(len)) if len > self.max_size => {
                tracing::debug!(len, max = self.max_size, "Request body too large");
                return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
            }
            Some(Some(_)) => {}
        }
        next.run(req).await
    }
}
