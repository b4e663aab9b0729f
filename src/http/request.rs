use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use url::Url;

use crate::http::cookie::{self, Cookie};
use crate::http::decoder::{BodyDecoderCollection, DecodeError, DecodedData};
use crate::http::headers::Headers;
use crate::http::parser::ParseError;

/// Longest raw request target accepted.
pub const MAX_URI_LENGTH: usize = 2083;

/// Host used to qualify the target when the request has no `Host` header.
const FALLBACK_HOST: &str = "127.0.0.1";

/// HTTP request methods.
///
/// Every method is served the same way: the target is looked up as a static
/// resource. Unknown methods are a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit data; the body is decoded before the resource is served
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Example
    ///
    /// ```
    /// # use warden::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        })
    }
}

/// A fully received request.
///
/// Built once, when the tokenizer reports the end of a message, and never
/// changed afterwards.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Absolute target, `http://<host>/<path>`. A bare `/` becomes
    /// `/index.html`.
    pub uri: Url,
    /// Path exactly as sent, without query or fragment.
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
    pub version: Version,
    pub headers: Headers,
    /// Parsed `Cookie` header, last cookie wins per name.
    pub cookies: HashMap<String, Cookie>,
    pub body: Bytes,
    pub content_length: usize,
    pub content_type: Option<String>,
    /// Text encoding named by the `Encoding` header, `utf-8` by default.
    pub encoding: String,
    pub keep_alive: bool,
}

/// Builder for constructing Request objects.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<String>,
    target: Option<String>,
    path: Option<String>,
    query: Option<String>,
    fragment: Option<String>,
    version: Option<Version>,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: Option<bool>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Raw request target as it appeared on the request line.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn build(self) -> Result<Request, ParseError> {
        let method_str = self.method.ok_or(ParseError::InvalidRequest)?;
        let method = Method::from_str(&method_str).ok_or(ParseError::InvalidMethod)?;
        let target = self.target.ok_or(ParseError::InvalidRequest)?;
        if target.len() > MAX_URI_LENGTH {
            return Err(ParseError::UriTooLong(target.len()));
        }

        let uri = resolve_uri(&target, self.headers.get("Host"))?;
        let version = self.version.unwrap_or(Version::Http11);

        let path = match self.path {
            Some(p) => p,
            None => split_target(&target).0.to_string(),
        };

        let mut cookies = HashMap::new();
        if let Some(header) = self.headers.get("Cookie") {
            for cookie in cookie::parse_cookies(header) {
                cookies.insert(cookie.name.clone(), cookie);
            }
        }

        let keep_alive = self
            .keep_alive
            .unwrap_or_else(|| default_keep_alive(version, self.headers.get("Connection")));
        let content_type = self.headers.get("Content-Type").map(str::to_string);
        let encoding = self
            .headers
            .get("Encoding")
            .map(|e| e.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "utf-8".to_string());

        Ok(Request {
            method,
            uri,
            path,
            query: self.query,
            fragment: self.fragment,
            version,
            content_length: self.body.len(),
            body: Bytes::from(self.body),
            headers: self.headers,
            cookies,
            content_type,
            encoding,
            keep_alive,
        })
    }
}

/// Qualifies the raw target with the `Host` header (or loopback) and maps a
/// bare `/` onto `/index.html`.
fn resolve_uri(target: &str, host: Option<&str>) -> Result<Url, ParseError> {
    let uri = if target.starts_with("http://") || target.starts_with("https://") {
        Url::parse(target)
    } else {
        if !target.starts_with('/') {
            return Err(ParseError::InvalidUri);
        }
        let host = host.map(str::trim).filter(|h| !h.is_empty()).unwrap_or(FALLBACK_HOST);
        if !is_authority(host) {
            return Err(ParseError::InvalidUri);
        }
        Url::parse(&format!("http://{host}{target}"))
    }
    .map_err(|_| ParseError::InvalidUri)?;

    if uri.path() == "/" || uri.path() == "//" {
        return uri.join("/index.html").map_err(|_| ParseError::InvalidUri);
    }
    Ok(uri)
}

/// A `Host` value must be `host[:port]` and nothing else, so it can never
/// contribute path, query or userinfo to the resolved URI.
fn is_authority(host: &str) -> bool {
    !host
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '@') || c.is_whitespace() || c.is_control())
}

/// Splits a request target into path, query and fragment.
pub(crate) fn split_target(target: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, fragment) = match target.split_once('#') {
        Some((r, f)) => (r, Some(f)),
        None => (target, None),
    };
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    (path, query, fragment)
}

/// HTTP/1.1 keeps the connection unless told to close; HTTP/1.0 closes
/// unless told to keep it.
pub(crate) fn default_keep_alive(version: Version, connection: Option<&str>) -> bool {
    let has = |token: &str| {
        connection
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    };
    match version {
        Version::Http11 => !has("close"),
        Version::Http10 => has("keep-alive"),
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Percent-decoded path of the resolved URI, used for resource lookup.
    pub fn resource_path(&self) -> String {
        let raw = self.uri.path();
        urlencoding::decode(raw)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| raw.to_string())
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    /// Runs the matching body decoder. Only called for requests that carry a
    /// body.
    pub fn decode_body(
        &self,
        decoders: &BodyDecoderCollection,
    ) -> Result<Option<DecodedData>, DecodeError> {
        if self.content_length == 0 {
            return Ok(None);
        }
        let Some(content_type) = self.content_type.as_deref() else {
            return Ok(None);
        };
        decoders.decode(&self.body, content_type, &self.encoding)
    }
}
