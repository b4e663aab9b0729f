//! Builds [`Request`]s from tokenizer callbacks.

use bytes::BytesMut;
use std::collections::VecDeque;

use crate::http::headers::Headers;
use crate::http::parser::{HeadInfo, HttpTokenizer, HttparseTokenizer, ParseError, ParserDelegate};
use crate::http::request::{Request, RequestBuilder};

/// Accumulates one message worth of callbacks.
#[derive(Debug, Default)]
pub(crate) struct MessageState {
    method: Option<String>,
    uri: Option<String>,
    path: Option<String>,
    query: Option<String>,
    fragment: Option<String>,
    header_name: Option<String>,
    header_value: Option<String>,
    pub(crate) headers: Headers,
    head: Option<HeadInfo>,
    body: BytesMut,
    max_body: Option<usize>,
    completed: VecDeque<Request>,
}

impl MessageState {
    fn commit_header(&mut self) {
        if let (Some(name), Some(value)) = (self.header_name.take(), self.header_value.take()) {
            self.headers.insert(name, value);
        }
    }

    fn clear_message(&mut self) {
        self.method = None;
        self.uri = None;
        self.path = None;
        self.query = None;
        self.fragment = None;
        self.header_name = None;
        self.header_value = None;
        self.headers = Headers::new();
        self.head = None;
        self.body.clear();
    }

    fn build(&mut self) -> Result<Request, ParseError> {
        self.commit_header();
        let head = self.head.ok_or(ParseError::InvalidRequest)?;

        let mut builder = RequestBuilder::new()
            .method(self.method.take().ok_or(ParseError::InvalidRequest)?)
            .target(self.uri.take().ok_or(ParseError::InvalidRequest)?)
            .version(head.version)
            .keep_alive(head.keep_alive)
            .headers(std::mem::take(&mut self.headers))
            .body(self.body.split().to_vec());
        if let Some(path) = self.path.take() {
            builder = builder.path(path);
        }
        if let Some(query) = self.query.take() {
            builder = builder.query(query);
        }
        if let Some(fragment) = self.fragment.take() {
            builder = builder.fragment(fragment);
        }
        builder.build()
    }
}

impl ParserDelegate for MessageState {
    fn on_message_begin(&mut self) {
        self.clear_message();
    }

    fn on_method(&mut self, method: &str) {
        self.method = Some(method.to_string());
    }

    fn on_request_uri(&mut self, uri: &str) {
        self.uri = Some(uri.to_string());
    }

    fn on_path(&mut self, path: &str) {
        self.path = Some(path.to_string());
    }

    fn on_query_string(&mut self, query: &str) {
        self.query = Some(query.to_string());
    }

    fn on_fragment(&mut self, fragment: &str) {
        self.fragment = Some(fragment.to_string());
    }

    fn on_header_name(&mut self, name: &str) {
        self.commit_header();
        self.header_name = Some(name.to_string());
    }

    fn on_header_value(&mut self, value: &str) -> Result<(), ParseError> {
        if self.header_name.is_none() {
            return Err(ParseError::HeaderValueWithoutName);
        }
        self.header_value = Some(value.to_string());
        Ok(())
    }

    fn on_headers_end(&mut self, head: HeadInfo) -> Result<(), ParseError> {
        self.commit_header();
        if let Some(limit) = self.max_body {
            if head.content_length > limit {
                return Err(ParseError::RequestTooLarge(limit));
            }
        }
        self.body.reserve(head.content_length);
        self.head = Some(head);
        Ok(())
    }

    fn on_body(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    fn on_message_end(&mut self) -> Result<(), ParseError> {
        let request = self.build();
        self.clear_message();
        self.completed.push_back(request?);
        Ok(())
    }
}

/// Feeds received bytes to a tokenizer and collects finished requests.
pub struct RequestAssembler {
    tokenizer: Box<dyn HttpTokenizer>,
    state: MessageState,
}

impl Default for RequestAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestAssembler {
    pub fn new() -> Self {
        Self::with_tokenizer(Box::new(HttparseTokenizer::new()))
    }

    pub fn with_tokenizer(tokenizer: Box<dyn HttpTokenizer>) -> Self {
        Self {
            tokenizer,
            state: MessageState::default(),
        }
    }

    /// Rejects messages announcing a body larger than `limit`.
    pub fn set_max_body(&mut self, limit: usize) {
        self.state.max_body = Some(limit);
    }

    /// Parses as much of `data` as possible and returns the number of bytes
    /// consumed. The caller keeps the rest for the next read.
    pub fn feed(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let result = self
            .tokenizer
            .execute(data, &mut self.state)
            .and_then(|consumed| {
                self.tokenizer.execute(&[], &mut self.state)?;
                Ok(consumed)
            });
        match result {
            Ok(consumed) => Ok(consumed.min(data.len())),
            Err(e) => {
                self.tokenizer.reset();
                self.state.clear_message();
                Err(e)
            }
        }
    }

    /// Takes the oldest completed request.
    pub fn next_request(&mut self) -> Option<Request> {
        self.state.completed.pop_front()
    }

    /// True while a message has started but not finished.
    pub fn in_message(&self) -> bool {
        self.state.head.is_some()
    }

    /// Discards partial and completed messages, ready for a new connection.
    pub fn reset(&mut self) {
        self.tokenizer.reset();
        self.state.clear_message();
        self.state.completed.clear();
    }
}

impl std::fmt::Debug for RequestAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAssembler")
            .field("in_message", &self.in_message())
            .field("completed", &self.state.completed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{Method, Version};

    #[test]
    fn assembles_get() {
        let mut a = RequestAssembler::new();
        let raw = b"GET /docs/a.html?x=1#top HTTP/1.1\r\nHost: example.com\r\nCookie: id=9\r\n\r\n";

        assert_eq!(a.feed(raw).unwrap(), raw.len());
        let req = a.next_request().unwrap();

        assert_eq!(req.method, Method::GET);
        assert_eq!(req.version, Version::Http11);
        assert_eq!(req.path, "/docs/a.html");
        assert_eq!(req.query.as_deref(), Some("x=1"));
        assert_eq!(req.fragment.as_deref(), Some("top"));
        assert_eq!(req.uri.as_str(), "http://example.com/docs/a.html?x=1#top");
        assert_eq!(req.cookie("id").unwrap().value, "9");
        assert!(req.keep_alive);
        assert!(a.next_request().is_none());
    }

    #[test]
    fn duplicate_headers_last_wins() {
        let mut a = RequestAssembler::new();
        a.feed(b"GET / HTTP/1.1\r\nX-Tag: one\r\nx-tag: two\r\n\r\n").unwrap();
        let req = a.next_request().unwrap();
        assert_eq!(req.header("X-TAG"), Some("two"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn body_is_contiguous() {
        let mut a = RequestAssembler::new();
        let head = b"POST /form HTTP/1.0\r\nContent-Length: 7\r\nContent-Type: text/plain\r\n\r\nabc";
        assert_eq!(a.feed(head).unwrap(), head.len());
        assert!(a.next_request().is_none());
        assert!(a.in_message());

        assert_eq!(a.feed(b"defg").unwrap(), 4);
        let req = a.next_request().unwrap();
        assert_eq!(&req.body[..], b"abcdefg");
        assert_eq!(req.content_length, 7);
        assert_eq!(req.content_type.as_deref(), Some("text/plain"));
        assert!(!req.keep_alive);
    }

    #[test]
    fn residual_bytes_are_left_for_the_caller() {
        let mut a = RequestAssembler::new();
        let mut raw = b"GET /1 HTTP/1.1\r\n\r\n".to_vec();
        let first_len = raw.len();
        raw.extend_from_slice(b"GET /2 HT");

        assert_eq!(a.feed(&raw).unwrap(), first_len);
        assert_eq!(a.next_request().unwrap().path, "/1");
        assert_eq!(a.feed(&raw[first_len..]).unwrap(), 0);
    }

    #[test]
    fn oversized_body_is_rejected() {
        let mut a = RequestAssembler::new();
        a.set_max_body(4);
        let err = a.feed(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n").unwrap_err();
        assert_eq!(err, ParseError::RequestTooLarge(4));
        assert!(!a.in_message());
    }

    #[test]
    fn long_uri_is_a_parse_error() {
        let mut a = RequestAssembler::new();
        let raw = format!("GET /{} HTTP/1.1\r\n\r\n", "x".repeat(3000));
        assert!(matches!(a.feed(raw.as_bytes()), Err(ParseError::UriTooLong(_))));
    }

    #[test]
    fn value_without_name_is_rejected() {
        let mut state = MessageState::default();
        assert_eq!(
            state.on_header_value("orphan"),
            Err(ParseError::HeaderValueWithoutName)
        );
    }
}
