use warden::http::assembler::RequestAssembler;
use warden::http::parser::ParseError;
use warden::http::request::{Method, Version};

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let mut assembler = RequestAssembler::new();
    let consumed = assembler.feed(req).unwrap();
    let parsed = assembler.next_request().unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, Version::Http11);
    assert_eq!(parsed.header("Host").unwrap(), "example.com");
    assert_eq!(parsed.uri.as_str(), "http://example.com/index.html");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_post_request_with_body() {
    let req = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let mut assembler = RequestAssembler::new();
    let consumed = assembler.feed(req).unwrap();
    let parsed = assembler.next_request().unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.path, "/api");
    assert_eq!(&parsed.body[..], b"hello");
    assert_eq!(parsed.content_length, 5);
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_multiple_headers() {
    let req = b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n";
    let mut assembler = RequestAssembler::new();
    assembler.feed(req).unwrap();
    let parsed = assembler.next_request().unwrap();

    assert_eq!(parsed.header("host").unwrap(), "example.com");
    assert_eq!(parsed.header("User-Agent").unwrap(), "test-client");
    assert_eq!(parsed.header("Accept").unwrap(), "*/*");
}

#[test]
fn test_parse_request_with_path_and_query_string() {
    let req = b"GET /search?q=rust HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let mut assembler = RequestAssembler::new();
    assembler.feed(req).unwrap();
    let parsed = assembler.next_request().unwrap();

    assert_eq!(parsed.path, "/search");
    assert_eq!(parsed.query.as_deref(), Some("q=rust"));
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    let mut assembler = RequestAssembler::new();

    assert_eq!(assembler.feed(req).unwrap(), 0);
    assert!(assembler.next_request().is_none());
}

#[test]
fn test_parse_request_split_across_reads() {
    let mut assembler = RequestAssembler::new();
    let mut buffer = b"GET /a.html HTTP/1.1\r\nHo".to_vec();

    let consumed = assembler.feed(&buffer).unwrap();
    buffer.drain(..consumed);
    buffer.extend_from_slice(b"st: x\r\n\r\n");
    let consumed = assembler.feed(&buffer).unwrap();

    assert_eq!(consumed, buffer.len());
    assert_eq!(assembler.next_request().unwrap().path, "/a.html");
}

#[test]
fn test_parse_http10_defaults_to_close() {
    let mut assembler = RequestAssembler::new();
    assembler.feed(b"GET / HTTP/1.0\r\n\r\n").unwrap();
    let parsed = assembler.next_request().unwrap();

    assert_eq!(parsed.version, Version::Http10);
    assert!(!parsed.keep_alive);
}

#[test]
fn test_parse_unknown_method() {
    let mut assembler = RequestAssembler::new();
    let err = assembler.feed(b"BREW /pot HTTP/1.1\r\n\r\n").unwrap_err();
    assert_eq!(err, ParseError::InvalidMethod);
}

#[test]
fn test_parse_invalid_version() {
    let mut assembler = RequestAssembler::new();
    assert!(assembler.feed(b"GET / HTTP/2.0\r\n\r\n").is_err());
}

#[test]
fn test_parse_uri_too_long() {
    let mut assembler = RequestAssembler::new();
    let req = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(2083));
    assert_eq!(
        assembler.feed(req.as_bytes()).unwrap_err(),
        ParseError::UriTooLong(2084)
    );
}
