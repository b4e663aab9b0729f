//! Incremental request tokenizer.
//!
//! The tokenizer turns raw bytes into callbacks on a [`ParserDelegate`]; it
//! does not build requests itself. [`HttparseTokenizer`] is the default
//! implementation: the request head is recognised with `httparse` once it has
//! fully arrived, the body is streamed through `on_body` in whatever chunks
//! the socket delivers.

use crate::http::request::{Version, default_keep_alive, split_target};

/// Most headers accepted in one request.
pub const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequest,
    #[error("unknown request method")]
    InvalidMethod,
    #[error("unsupported protocol version")]
    InvalidVersion,
    #[error("malformed header")]
    InvalidHeader,
    #[error("header value without a name")]
    HeaderValueWithoutName,
    #[error("too many headers")]
    TooManyHeaders,
    #[error("invalid content length")]
    InvalidContentLength,
    #[error("unsupported transfer encoding")]
    UnsupportedTransferEncoding,
    #[error("uri length {0} exceeds the allowed maximum")]
    UriTooLong(usize),
    #[error("invalid request uri")]
    InvalidUri,
    #[error("request exceeds {0} bytes")]
    RequestTooLarge(usize),
}

/// Facts known once the head of a message is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadInfo {
    pub version: Version,
    pub keep_alive: bool,
    pub content_length: usize,
}

/// Callbacks raised by a tokenizer, in message order.
pub trait ParserDelegate {
    fn on_message_begin(&mut self);
    fn on_method(&mut self, method: &str);
    fn on_request_uri(&mut self, uri: &str);
    fn on_path(&mut self, path: &str);
    fn on_query_string(&mut self, query: &str);
    fn on_fragment(&mut self, fragment: &str);
    fn on_header_name(&mut self, name: &str);
    fn on_header_value(&mut self, value: &str) -> Result<(), ParseError>;
    fn on_headers_end(&mut self, head: HeadInfo) -> Result<(), ParseError>;
    fn on_body(&mut self, chunk: &[u8]);
    fn on_message_end(&mut self) -> Result<(), ParseError>;
}

/// A byte-to-token HTTP request parser.
pub trait HttpTokenizer: Send {
    /// Feeds `data` and returns how many bytes were consumed. Bytes not
    /// consumed must be offered again, with more appended, on the next call.
    ///
    /// Parsing pauses after each complete message so the caller can answer it
    /// before the next one is read. A zero-length call flushes pending
    /// callbacks at the end of the stream.
    fn execute(&mut self, data: &[u8], delegate: &mut dyn ParserDelegate) -> Result<usize, ParseError>;

    /// Drops any partial message.
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Head,
    Body { remaining: usize },
}

#[derive(Debug)]
pub struct HttparseTokenizer {
    state: State,
}

impl Default for HttparseTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttparseTokenizer {
    pub fn new() -> Self {
        Self { state: State::Head }
    }

    fn parse_head(&mut self, data: &[u8], delegate: &mut dyn ParserDelegate) -> Result<usize, ParseError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let head_len = match req.parse(data).map_err(map_httparse_error)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Ok(0),
        };

        let method = req.method.ok_or(ParseError::InvalidRequest)?;
        let target = req.path.ok_or(ParseError::InvalidRequest)?;
        let version = match req.version {
            Some(0) => Version::Http10,
            Some(1) => Version::Http11,
            _ => return Err(ParseError::InvalidVersion),
        };

        delegate.on_message_begin();
        delegate.on_method(method);
        delegate.on_request_uri(target);
        let (path, query, fragment) = split_target(target);
        delegate.on_path(path);
        if let Some(q) = query {
            delegate.on_query_string(q);
        }
        if let Some(f) = fragment {
            delegate.on_fragment(f);
        }

        let mut content_length = 0usize;
        let mut connection: Option<String> = None;
        for header in req.headers.iter() {
            let value = std::str::from_utf8(header.value).map_err(|_| ParseError::InvalidHeader)?;
            delegate.on_header_name(header.name);
            delegate.on_header_value(value)?;

            if header.name.eq_ignore_ascii_case("Content-Length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| ParseError::InvalidContentLength)?;
            } else if header.name.eq_ignore_ascii_case("Transfer-Encoding")
                && !value.trim().eq_ignore_ascii_case("identity")
            {
                return Err(ParseError::UnsupportedTransferEncoding);
            } else if header.name.eq_ignore_ascii_case("Connection") {
                connection = Some(value.to_string());
            }
        }

        delegate.on_headers_end(HeadInfo {
            version,
            keep_alive: default_keep_alive(version, connection.as_deref()),
            content_length,
        })?;

        self.state = State::Body {
            remaining: content_length,
        };
        Ok(head_len)
    }

    fn parse_body(
        &mut self,
        data: &[u8],
        remaining: usize,
        delegate: &mut dyn ParserDelegate,
    ) -> Result<usize, ParseError> {
        let take = remaining.min(data.len());
        if take > 0 {
            delegate.on_body(&data[..take]);
        }
        let remaining = remaining - take;
        if remaining == 0 {
            self.state = State::Head;
            delegate.on_message_end()?;
        } else {
            self.state = State::Body { remaining };
        }
        Ok(take)
    }
}

impl HttpTokenizer for HttparseTokenizer {
    fn execute(&mut self, data: &[u8], delegate: &mut dyn ParserDelegate) -> Result<usize, ParseError> {
        if data.is_empty() {
            // Nothing is buffered inside the tokenizer; a flush can only
            // finish a message whose body is already complete.
            if self.state == (State::Body { remaining: 0 }) {
                return self.parse_body(data, 0, delegate);
            }
            return Ok(0);
        }

        let mut consumed = 0;
        if self.state == State::Head {
            consumed = self.parse_head(data, delegate)?;
            if consumed == 0 {
                return Ok(0);
            }
        }

        if let State::Body { remaining } = self.state {
            consumed += self.parse_body(&data[consumed..], remaining, delegate)?;
        }
        Ok(consumed)
    }

    fn reset(&mut self) {
        self.state = State::Head;
    }
}

fn map_httparse_error(e: httparse::Error) -> ParseError {
    match e {
        httparse::Error::HeaderName | httparse::Error::HeaderValue => ParseError::InvalidHeader,
        httparse::Error::TooManyHeaders => ParseError::TooManyHeaders,
        httparse::Error::Version => ParseError::InvalidVersion,
        _ => ParseError::InvalidRequest,
    }
}
