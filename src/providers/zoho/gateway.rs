use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ZohoError;
use crate::model::token::AccessToken;
use crate::util::text::preview;

#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// Nothing to read (204, or a blank body on a read).
    Empty,
    Ack,
    Json(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Collection,
    Write,
}

/// Zoho serves some resources only from the legacy `restapi` tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V3,
    Rest,
}

pub fn resource_path(version: ApiVersion, portal_id: &str, segments: &[&str]) -> String {
    let mut path = match version {
        ApiVersion::V3 => format!("/api/v3/portal/{}", urlencoding::encode(portal_id)),
        ApiVersion::Rest => format!("/restapi/portal/{}", urlencoding::encode(portal_id)),
    };
    for segment in segments {
        path.push('/');
        path.push_str(&urlencoding::encode(segment));
    }
    if version == ApiVersion::Rest {
        path.push('/');
    }
    path
}

pub fn http_client(timeout: Option<Duration>) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().unwrap_or_default()
}

pub struct Gateway {
    client: reqwest::Client,
    base_url: String,
    preview_limit: usize,
}

impl Gateway {
    pub fn new(base_url: &str, timeout: Option<Duration>, preview_limit: usize) -> Self {
        Self {
            client: http_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            preview_limit,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        path: &str,
        token: &AccessToken,
        body: Option<&Value>,
        expect: Expect,
    ) -> Result<RawResult, ZohoError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(AUTHORIZATION, format!("Zoho-oauthtoken {}", token.secret()));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &url))?;
        let status = response.status();
        debug!(%method, path, status = status.as_u16(), "zoho response");

        if status == StatusCode::NO_CONTENT {
            return Ok(match expect {
                Expect::Collection => RawResult::Empty,
                Expect::Write => RawResult::Ack,
            });
        }
        if status == StatusCode::UNAUTHORIZED {
            warn!(%method, path, "zoho rejected the access token");
            return Err(ZohoError::Unauthorized);
        }

        let text = response
            .text()
            .await
            .map_err(|e| classify_transport_error(&e, &url))?;
        debug!(path, body = %preview(&text, self.preview_limit), "zoho body");

        let result = decode_body(status, &text, expect, self.preview_limit);
        if let Err(err) = &result {
            warn!(%method, path, error = %err, "zoho call failed");
        }
        result
    }
}

/// The one place a response body is interpreted. Success with an unreadable
/// body is treated as an acknowledgement; failure with an unreadable body keeps
/// a bounded excerpt for diagnostics.
pub fn decode_body(
    status: StatusCode,
    text: &str,
    expect: Expect,
    preview_limit: usize,
) -> Result<RawResult, ZohoError> {
    let trimmed = text.trim();
    let parsed = if trimmed.is_empty() {
        None
    } else {
        serde_json::from_str::<Value>(trimmed).ok()
    };

    if status.is_success() {
        return Ok(match (parsed, expect) {
            (Some(Value::Null), Expect::Collection) | (None, Expect::Collection)
                if trimmed.is_empty() || trimmed == "null" =>
            {
                RawResult::Empty
            }
            (Some(Value::Null), _) | (None, _) => RawResult::Ack,
            (Some(value), _) => RawResult::Json(value),
        });
    }

    match parsed {
        Some(value) => Err(ZohoError::UpstreamStatus {
            status: status.as_u16(),
            message: error_message(&value)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            preview: preview(trimmed, preview_limit),
        }),
        None => Err(ZohoError::MalformedUpstreamResponse {
            status: status.as_u16(),
            preview: preview(trimmed, preview_limit),
        }),
    }
}

fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error");
    error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| error.and_then(|e| e.get("title")).and_then(Value::as_str))
        .or_else(|| error.and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))
        .or_else(|| value.get("error_description").and_then(Value::as_str))
        .map(String::from)
}

pub fn classify_transport_error(err: &reqwest::Error, target: &str) -> ZohoError {
    let target = target.split('?').next().unwrap_or(target).to_string();
    if err.is_connect() || err.is_builder() {
        ZohoError::Unreachable {
            target,
            message: err.to_string(),
        }
    } else {
        ZohoError::TransientNetwork {
            target,
            message: err.to_string(),
        }
    }
}
