//! Request construction and authentication headers

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Serialize;
use std::collections::BTreeMap;

use super::Method;
use crate::error::ApiError;

/// Supplies headers added to every request
pub trait AuthProvider: Send + Sync {
    fn headers(&self) -> BTreeMap<String, String>;
}

/// No authentication headers
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn headers(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// `Authorization: Bearer <token>`
#[derive(Clone)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

impl AuthProvider for BearerToken {
    fn headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(AUTHORIZATION.to_string(), format!("Bearer {}", self.0))])
    }
}

/// A request ready to hand to a [`Transport`](super::Transport)
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Joins `base_url` and `path`, appends `query` and encodes `body` as JSON.
///
/// Bodies are only attached for methods that carry one; such methods fail with
/// [`ApiError::MissingBody`] when `body` is `None`.
pub fn build_request<B: Serialize + ?Sized>(
    method: Method,
    base_url: &str,
    path: &str,
    headers: &BTreeMap<String, String>,
    query: &[(String, String)],
    body: Option<&B>,
) -> Result<PreparedRequest, ApiError> {
    let url = build_url(base_url, path, query)?;

    let body = match (method.carries_body(), body) {
        (true, Some(body)) => Some(
            serde_json::to_vec(body).map_err(|e| ApiError::EncodeFailure(e.to_string()))?,
        ),
        (true, None) => return Err(ApiError::MissingBody(method)),
        (false, _) => None,
    };

    let mut header_map = HeaderMap::new();
    header_map.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if body.is_some() {
        header_map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::EncodeFailure(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::EncodeFailure(format!("header {name}: {e}")))?;
        header_map.insert(name, value);
    }

    Ok(PreparedRequest {
        method,
        url,
        headers: header_map,
        body,
    })
}

fn build_url(base_url: &str, path: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
    let path = path.trim_start_matches('/');
    let target = if path.is_empty() {
        base_url.to_string()
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    };

    let mut url =
        Url::parse(&target).map_err(|e| ApiError::InvalidTarget(format!("{target}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::InvalidTarget(format!(
            "{target}: unsupported scheme {}",
            url.scheme()
        )));
    }

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}
