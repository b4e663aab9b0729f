use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::http::cookie::Cookie;
use crate::http::headers::Headers;
use crate::http::request::{Request, Version};
use crate::resource::CachedResource;

/// HTTP status codes used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 304 Not Modified
    NotModified,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 415 Unsupported Media Type
    UnsupportedMediaType,
    /// 417 Expectation Failed
    ExpectationFailed,
    /// 500 Internal Server Error
    InternalServerError,
    /// 503 Service Unavailable
    ServiceUnavailable,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use warden::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::UnsupportedMediaType => 415,
            StatusCode::ExpectationFailed => 417,
            StatusCode::InternalServerError => 500,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::UnsupportedMediaType => "Unsupported Media Type",
            StatusCode::ExpectationFailed => "Expectation Failed",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// Statuses that never carry a body.
    pub fn is_bodiless(&self) -> bool {
        matches!(self, StatusCode::NotModified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Close,
    KeepAlive,
}

impl ConnectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMode::Close => "Close",
            ConnectionMode::KeepAlive => "Keep-Alive",
        }
    }
}

/// Where the response body comes from.
///
/// A resource body borrows the cache's handle; the writer reads through it
/// and never closes it.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Resource(Arc<CachedResource>),
}

impl Body {
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(b) => b.len() as u64,
            Body::Resource(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Response under construction for one request.
#[derive(Debug, Clone)]
pub struct Response {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
    pub headers: Headers,
    pub cookies: BTreeMap<String, Cookie>,
    pub body: Body,
    pub content_type: String,
    pub connection: ConnectionMode,
}

impl Response {
    /// An empty 200 response with the default content type.
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::Http11,
            status,
            reason: status.reason_phrase().to_string(),
            headers: Headers::new(),
            cookies: BTreeMap::new(),
            body: Body::Empty,
            content_type: "text/html".to_string(),
            connection: ConnectionMode::Close,
        }
    }

    /// A 200 response answering `req`: same protocol version, the request's
    /// cookies echoed back, and its keep-alive preference.
    pub fn for_request(req: &Request) -> Self {
        let mut resp = Self::new(StatusCode::Ok);
        resp.version = req.version;
        resp.cookies = req
            .cookies
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        resp.connection = if req.keep_alive {
            ConnectionMode::KeepAlive
        } else {
            ConnectionMode::Close
        };
        resp
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        self.reason = status.reason_phrase().to_string();
    }

    /// Adds or replaces a header.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = Body::Bytes(body.into());
    }

    pub fn content_length(&self) -> u64 {
        if self.status.is_bodiless() {
            0
        } else {
            self.body.len()
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.connection == ConnectionMode::KeepAlive
    }
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use warden::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("Cache-Control", "no-cache")
///     .content_type("text/plain")
///     .body(b"hi".to_vec())
///     .build();
/// assert_eq!(response.content_length(), 2);
/// ```
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            response: Response::new(status),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.response.add(key, value);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.response.content_type = content_type.into();
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.response.cookies.insert(cookie.name.clone(), cookie);
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.response.connection = if keep_alive {
            ConnectionMode::KeepAlive
        } else {
            ConnectionMode::Close
        };
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.response.set_body(body);
        self
    }

    pub fn build(self) -> Response {
        self.response
    }
}
