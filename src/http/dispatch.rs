//! Turns a parsed request into a response for a static resource.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::http::decoder::{BodyDecoderCollection, DecodeError};
use crate::http::mime;
use crate::http::request::Request;
use crate::http::response::{Body, ConnectionMode, Response, StatusCode};
use crate::resource::{ResourceCache, ResourceError};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("access to {0} is forbidden")]
    Forbidden(String),
    #[error("{0} was not found")]
    NotFound(String),
    #[error("no content type is known for {0}")]
    UnsupportedMediaType(String),
    #[error("{path} is {len} bytes, above the {limit} byte limit")]
    TooLarge { path: String, len: u64, limit: u64 },
    #[error("request body could not be decoded: {0}")]
    Decode(#[from] DecodeError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Forbidden(_) => StatusCode::Forbidden,
            DispatchError::NotFound(_) => StatusCode::NotFound,
            DispatchError::UnsupportedMediaType(_) => StatusCode::UnsupportedMediaType,
            DispatchError::TooLarge { .. } => StatusCode::ExpectationFailed,
            DispatchError::Decode(_) => StatusCode::BadRequest,
            DispatchError::Internal(_) => StatusCode::InternalServerError,
        }
    }

    /// Errors after which the connection is not reused.
    pub fn closes_connection(&self) -> bool {
        matches!(self, DispatchError::Decode(_) | DispatchError::Internal(_))
    }
}

/// Values stamped onto every response.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub server_name: String,
    pub keep_alive_timeout_secs: u64,
    pub keep_alive_max_requests: u32,
    /// 0 means unlimited.
    pub content_length_limit: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for DispatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            server_name: config.server.server_name.clone(),
            keep_alive_timeout_secs: config.server.keep_alive_timeout_secs,
            keep_alive_max_requests: config.server.keep_alive_max_requests,
            content_length_limit: config.resources.content_length_limit,
        }
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    resources: Arc<ResourceCache>,
    decoders: BodyDecoderCollection,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(resources: Arc<ResourceCache>, decoders: BodyDecoderCollection, settings: DispatchSettings) -> Self {
        Self {
            resources,
            decoders,
            settings,
        }
    }

    pub fn resources(&self) -> &Arc<ResourceCache> {
        &self.resources
    }

    /// Builds the response for `req`. `keep_alive` is the connection's
    /// decision for this exchange, which may be stricter than the request's.
    ///
    /// Performs blocking file I/O on first access to a resource.
    pub fn dispatch(&self, req: &Request, keep_alive: bool) -> Result<Response, DispatchError> {
        if req.content_length > 0 {
            if let Some(data) = req.decode_body(&self.decoders)? {
                tracing::debug!(
                    path = %req.path,
                    parameters = data.parameters.len(),
                    files = data.files.len(),
                    "Decoded request body"
                );
            }
        }

        let path = req.resource_path();

        // Files that could never be served are not opened or cached.
        let Some(content_type) = mime::for_path(&path) else {
            return Err(match self.resources.resolve(&path) {
                Err(ResourceError::Forbidden) => DispatchError::Forbidden(path),
                _ if self.resources.exists(&path) => DispatchError::UnsupportedMediaType(path),
                _ => DispatchError::NotFound(path),
            });
        };

        let resource = match self.resources.get(&path) {
            Ok(Some(r)) => r,
            Ok(None) => return Err(DispatchError::NotFound(path)),
            Err(ResourceError::Forbidden) => return Err(DispatchError::Forbidden(path)),
            Err(e) => return Err(DispatchError::Internal(e.to_string())),
        };

        let limit = self.settings.content_length_limit;
        if limit > 0 && resource.len() > limit {
            return Err(DispatchError::TooLarge {
                path,
                len: resource.len(),
                limit,
            });
        }

        let mut resp = Response::for_request(req);
        self.stamp(&mut resp, keep_alive);
        resp.content_type = content_type.to_string();
        resp.add("Last-Modified", httpdate::fmt_http_date(resource.modified_at()));

        if not_modified_since(req, resource.modified_secs()) {
            resp.set_status(StatusCode::NotModified);
            return Ok(resp);
        }

        resp.body = Body::Resource(resource);
        Ok(resp)
    }

    /// A response carrying `status`, for the request when one was parsed.
    pub fn error_response(&self, req: Option<&Request>, status: StatusCode, keep_alive: bool) -> Response {
        let mut resp = match req {
            Some(r) => Response::for_request(r),
            None => Response::new(status),
        };
        resp.set_status(status);
        self.stamp(&mut resp, keep_alive);
        resp
    }

    fn stamp(&self, resp: &mut Response, keep_alive: bool) {
        resp.add("Date", httpdate::fmt_http_date(SystemTime::now()));
        resp.add("Server", self.settings.server_name.as_str());
        if keep_alive {
            resp.connection = ConnectionMode::KeepAlive;
            resp.add(
                "Keep-Alive",
                format!(
                    "timeout={}, max={}",
                    self.settings.keep_alive_timeout_secs, self.settings.keep_alive_max_requests
                ),
            );
        } else {
            resp.connection = ConnectionMode::Close;
        }
    }
}

/// True when the request carries a parseable `If-Modified-Since` at or after
/// `modified_secs`.
fn not_modified_since(req: &Request, modified_secs: u64) -> bool {
    let Some(since) = req
        .header("If-Modified-Since")
        .and_then(|v| httpdate::parse_http_date(v.trim()).ok())
    else {
        return false;
    };
    let since_secs = since
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    since_secs >= modified_secs
}
