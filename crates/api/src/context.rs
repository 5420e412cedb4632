//! Caller identity extraction.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::RequestContext;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_TYPE_HEADER: &str = "X-User-Type";
pub const SERVICE_NAME_HEADER: &str = "X-Service-Name";

/// The request context, parsed from the gateway headers.
#[derive(Debug, Clone)]
pub struct Caller(pub RequestContext);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let context = RequestContext::from_parts(
            header(headers, USER_ID_HEADER),
            header(headers, USER_TYPE_HEADER),
            header(headers, SERVICE_NAME_HEADER),
        )?;
        Ok(Caller(context))
    }
}
