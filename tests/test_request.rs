use warden::http::cookie::parse_cookies;
use warden::http::decoder::BodyDecoderCollection;
use warden::http::request::{Method, RequestBuilder};

#[test]
fn test_request_header_retrieval() {
    let req = RequestBuilder::new()
        .method("GET")
        .target("/")
        .header("Host", "example.com")
        .header("Content-Type", "application/json")
        .build()
        .unwrap();

    assert_eq!(req.header("host"), Some("example.com"));
    assert_eq!(req.header("Content-Type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_content_length_follows_body() {
    let req = RequestBuilder::new()
        .method("POST")
        .target("/api")
        .body(b"0123456789".to_vec())
        .build()
        .unwrap();

    assert_eq!(req.method, Method::POST);
    assert_eq!(req.content_length, 10);
}

#[test]
fn test_request_content_length_missing() {
    let req = RequestBuilder::new().method("GET").target("/").build().unwrap();
    assert_eq!(req.content_length, 0);
    assert!(req.body.is_empty());
}

#[test]
fn test_request_encoding_header() {
    let req = RequestBuilder::new().method("GET").target("/").build().unwrap();
    assert_eq!(req.encoding, "utf-8");

    let req = RequestBuilder::new()
        .method("GET")
        .target("/")
        .header("Encoding", "US-ASCII")
        .build()
        .unwrap();
    assert_eq!(req.encoding, "us-ascii");
}

#[test]
fn test_request_absolute_target() {
    let req = RequestBuilder::new()
        .method("GET")
        .target("http://other.example/x.html")
        .header("Host", "ignored.example")
        .build()
        .unwrap();
    assert_eq!(req.uri.host_str(), Some("other.example"));
}

#[test]
fn test_request_decode_form_body() {
    let decoders = BodyDecoderCollection::with_defaults();
    let req = RequestBuilder::new()
        .method("POST")
        .target("/submit.html")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(b"user=ada&lang=rust".to_vec())
        .build()
        .unwrap();

    let data = req.decode_body(&decoders).unwrap().unwrap();
    assert_eq!(data.parameter("user"), Some("ada"));
    assert_eq!(data.parameter("lang"), Some("rust"));
}

#[test]
fn test_request_without_body_is_not_decoded() {
    let decoders = BodyDecoderCollection::with_defaults();
    let req = RequestBuilder::new()
        .method("POST")
        .target("/submit.html")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .build()
        .unwrap();

    assert!(req.decode_body(&decoders).unwrap().is_none());
}

#[test]
fn test_cookie_single_name_value() {
    let cookies = parse_cookies("session=abc123");
    assert_eq!(cookies.len(), 1);
    let c = &cookies[0];
    assert_eq!(c.name, "session");
    assert_eq!(c.value, "abc123");
    assert!(c.domain.is_none());
    assert!(c.path.is_none());
    assert!(c.expires.is_none());
    assert!(!c.secure && !c.http_only && !c.discard);
}

#[test]
fn test_cookie_with_attributes() {
    let cookies = parse_cookies("a=1; Path=/x; Secure");
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0].value, "1");
    assert_eq!(cookies[0].path.as_deref(), Some("/x"));
    assert!(cookies[0].secure);
    assert!(cookies[0].domain.is_none());
}

#[test]
fn test_cookie_malformed_segment_is_skipped() {
    let cookies = parse_cookies("good=1, bad=\"never closed, other=2");
    let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"good"));
    assert!(names.contains(&"other"));
    assert!(!names.contains(&"bad"));
}

#[test]
fn test_request_cookie_map() {
    let req = RequestBuilder::new()
        .method("GET")
        .target("/")
        .header("Cookie", "theme=dark; Path=/, lang=en")
        .build()
        .unwrap();

    assert_eq!(req.cookie("theme").unwrap().value, "dark");
    assert_eq!(req.cookie("theme").unwrap().path.as_deref(), Some("/"));
    assert_eq!(req.cookie("lang").unwrap().value, "en");
}
