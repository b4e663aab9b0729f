//! Response serialization.
//!
//! Head layout: status line, `Content-Type`, `Content-Length`, `Connection`,
//! the response headers in insertion order, one `Set-Cookie` line per cookie,
//! blank line. The body follows, either from memory or streamed from a cached
//! resource.

use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::{Body, Response, StatusCode};
use crate::resource::CachedResource;

/// Bytes read from a cached resource per write.
const CHUNK_SIZE: usize = 64 * 1024;

/// Written verbatim to connections shed by admission control.
pub const SERVICE_UNAVAILABLE: &[u8] = b"HTTP/1.1 503 Service Unavailable\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Content-Length: 126\r\n\
Connection: Close\r\n\
\r\n\
<html><body><h1>503 - Service Unavailable</h1><p>The server is overloaded. The client can try again later.</p></body></html>\r\n";

pub fn serialize_head(resp: &Response) -> Vec<u8> {
    let mut head = String::with_capacity(256);

    head.push_str(&format!(
        "{} {} {}\r\n",
        resp.version,
        resp.status.as_u16(),
        resp.reason
    ));
    head.push_str(&format!("Content-Type: {}\r\n", resp.content_type));
    head.push_str(&format!("Content-Length: {}\r\n", resp.content_length()));
    head.push_str(&format!("Connection: {}\r\n", resp.connection.as_str()));

    for (name, value) in resp.headers.iter() {
        if is_framing_header(name) {
            continue;
        }
        head.push_str(&format!("{name}: {value}\r\n"));
    }

    for cookie in resp.cookies.values() {
        head.push_str(&format!("Set-Cookie: {cookie}\r\n"));
    }

    head.push_str("\r\n");
    head.into_bytes()
}

fn is_framing_header(name: &str) -> bool {
    ["Content-Type", "Content-Length", "Connection"]
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseWriter;

impl ResponseWriter {
    pub fn new() -> Self {
        Self
    }

    /// Writes `resp` to `stream`. Failures are logged and reported as
    /// `false`; they never propagate. With `head_only` the body is skipped.
    pub async fn send<S>(&self, stream: &mut S, resp: &Response, head_only: bool) -> bool
    where
        S: AsyncWrite + Unpin + ?Sized,
    {
        match self.write_response(stream, resp, head_only).await {
            Ok(written) => {
                tracing::trace!(status = resp.status.as_u16(), bytes = written, "Response sent");
                true
            }
            Err(e) => {
                tracing::debug!(status = resp.status.as_u16(), error = %e, "Failed to send response");
                false
            }
        }
    }

    async fn write_response<S>(&self, stream: &mut S, resp: &Response, head_only: bool) -> anyhow::Result<u64>
    where
        S: AsyncWrite + Unpin + ?Sized,
    {
        let head = serialize_head(resp);
        stream.write_all(&head).await?;
        let mut written = head.len() as u64;

        if !head_only && !resp.status.is_bodiless() {
            written += match &resp.body {
                Body::Empty => 0,
                Body::Bytes(bytes) => {
                    stream.write_all(bytes).await?;
                    bytes.len() as u64
                }
                Body::Resource(resource) => stream_resource(stream, resource).await?,
            };
        }

        stream.flush().await?;
        Ok(written)
    }

    /// Replaces the body of `resp` with an HTML page describing the failure
    /// and sends it. The connection mode is left as the caller set it.
    pub async fn send_error_page<S>(&self, stream: &mut S, mut resp: Response, detail: Option<&str>) -> bool
    where
        S: AsyncWrite + Unpin + ?Sized,
    {
        resp.content_type = "text/html; charset=utf-8".to_string();
        resp.set_body(error_page(resp.status, &resp.reason, detail));
        self.send(stream, &resp, false).await
    }
}

/// Reads the resource from its start in fixed chunks. The handle stays open.
async fn stream_resource<S>(stream: &mut S, resource: &Arc<CachedResource>) -> anyhow::Result<u64>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let mut offset = 0u64;
    while offset < resource.len() {
        let r = resource.clone();
        let chunk = tokio::task::spawn_blocking(move || r.read_chunk(offset, CHUNK_SIZE)).await??;
        if chunk.is_empty() {
            anyhow::bail!("resource shrank while streaming: {}", resource.path().display());
        }
        stream.write_all(&chunk).await?;
        offset += chunk.len() as u64;
    }
    Ok(offset)
}

/// Minimal HTML error page.
pub fn error_page(status: StatusCode, reason: &str, detail: Option<&str>) -> String {
    let reason = escape_html(reason);
    let detail = detail.map(escape_html).unwrap_or_default();
    format!(
        "<html>\n<head>\n<meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\" />\n\
         <title>{reason}</title>\n</head>\n<body>\n<h1>{code} - {reason}</h1>\n<pre>{detail}</pre>\n</body>\n</html>\n",
        code = status.as_u16(),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::assembler::MessageState;
    use crate::http::cookie::Cookie;
    use crate::http::parser::{HeadInfo, ParserDelegate};
    use crate::http::request::Version;
    use crate::http::response::ResponseBuilder;

    #[test]
    fn head_layout() {
        let mut cookie = Cookie::new("sid", "42");
        cookie.path = Some("/".to_string());
        let resp = ResponseBuilder::new(StatusCode::Ok)
            .header("Server", "warden")
            .header("X-Extra", "1")
            .cookie(cookie)
            .keep_alive(true)
            .body("hello")
            .build();

        let head = String::from_utf8(serialize_head(&resp)).unwrap();
        assert_eq!(
            head,
            "HTTP/1.1 200 OK\r\n\
             Content-Type: text/html\r\n\
             Content-Length: 5\r\n\
             Connection: Keep-Alive\r\n\
             Server: warden\r\n\
             X-Extra: 1\r\n\
             Set-Cookie: sid=42;path=/\r\n\
             \r\n"
        );
    }

    #[test]
    fn not_modified_has_no_length() {
        let resp = ResponseBuilder::new(StatusCode::NotModified).body("ignored").build();
        let head = String::from_utf8(serialize_head(&resp)).unwrap();
        assert!(head.starts_with("HTTP/1.1 304 Not Modified\r\n"));
        assert!(head.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn service_unavailable_length_matches_body() {
        let text = std::str::from_utf8(SERVICE_UNAVAILABLE).unwrap();
        let (head, body) = text.split_once("\r\n\r\n").unwrap();
        assert!(head.contains(&format!("Content-Length: {}", body.len())));
    }

    #[test]
    fn error_page_escapes_detail() {
        let page = error_page(StatusCode::BadRequest, "Bad Request", Some("<script>"));
        assert!(page.contains("<h1>400 - Bad Request</h1>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn headers_survive_a_round_trip() {
        let resp = ResponseBuilder::new(StatusCode::Ok)
            .header("Date", "Sun, 06 Nov 1994 08:49:37 GMT")
            .header("X-Trace", "abc")
            .header("x-trace", "def")
            .body("body")
            .build();
        let head = serialize_head(&resp);

        let mut headers = [httparse::EMPTY_HEADER; 16];
        let mut parsed = httparse::Response::new(&mut headers);
        assert!(parsed.parse(&head).unwrap().is_complete());

        let mut state = MessageState::default();
        for h in parsed.headers.iter() {
            state.on_header_name(h.name);
            state.on_header_value(std::str::from_utf8(h.value).unwrap()).unwrap();
        }
        state.on_headers_end(HeadInfo {
            version: Version::Http11,
            keep_alive: true,
            content_length: 0,
        })
        .unwrap();

        assert_eq!(state.headers.get("x-trace"), Some("def"));
        assert_eq!(state.headers.get("content-length"), Some("4"));
        assert_eq!(state.headers.get("DATE"), Some("Sun, 06 Nov 1994 08:49:37 GMT"));
        for (name, value) in resp.headers.iter() {
            assert_eq!(state.headers.get(name), Some(value));
        }
    }

    #[tokio::test]
    async fn send_writes_bytes_body() {
        let resp = ResponseBuilder::new(StatusCode::Ok).body("hi").build();
        let mut out: Vec<u8> = Vec::new();
        assert!(ResponseWriter::new().send(&mut out, &resp, false).await);
        assert!(out.ends_with(b"\r\n\r\nhi"));
    }

    #[tokio::test]
    async fn head_only_skips_body() {
        let resp = ResponseBuilder::new(StatusCode::Ok).body("hi").build();
        let mut out: Vec<u8> = Vec::new();
        assert!(ResponseWriter::new().send(&mut out, &resp, true).await);
        assert!(out.ends_with(b"Content-Length: 2\r\nConnection: Close\r\n\r\n"));
    }
}
