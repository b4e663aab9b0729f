//! Request body decoders.
//!
//! A decoder declares the content types it understands; the collection picks
//! the first match for a request's `Content-Type`.

use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported text encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("malformed body: {0}")]
    Malformed(String),
}

/// A parsed `Content-Type` header: the media type plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeHeader {
    pub media_type: String,
    pub parameters: Vec<(String, String)>,
}

impl ContentTypeHeader {
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split(';');
        let media_type = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let parameters = parts
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| {
                (
                    k.trim().to_ascii_lowercase(),
                    v.trim().trim_matches('"').to_string(),
                )
            })
            .collect();
        Self {
            media_type,
            parameters,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedData {
    /// Form fields in body order. A name may repeat.
    pub parameters: Vec<(String, String)>,
    pub files: Vec<DecodedFile>,
}

impl DecodedData {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub trait BodyDecoder: Send + Sync {
    /// Media types this decoder accepts, lower case.
    fn content_types(&self) -> &[&'static str];

    /// Decodes `body`. `Ok(None)` means there was nothing to decode.
    fn decode(
        &self,
        body: &[u8],
        content_type: &ContentTypeHeader,
        encoding: &str,
    ) -> Result<Option<DecodedData>, DecodeError>;
}

#[derive(Default)]
pub struct BodyDecoderCollection {
    decoders: Vec<Box<dyn BodyDecoder>>,
}

impl BodyDecoderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// The decoders shipped with the server.
    pub fn with_defaults() -> Self {
        let mut c = Self::new();
        c.add(UrlEncodedDecoder);
        c
    }

    pub fn add(&mut self, decoder: impl BodyDecoder + 'static) {
        self.decoders.push(Box::new(decoder));
    }

    /// Decodes with the first decoder that accepts `content_type`. No match
    /// yields `Ok(None)`.
    pub fn decode(
        &self,
        body: &[u8],
        content_type: &str,
        encoding: &str,
    ) -> Result<Option<DecodedData>, DecodeError> {
        let header = ContentTypeHeader::parse(content_type);
        let Some(decoder) = self
            .decoders
            .iter()
            .find(|d| d.content_types().iter().any(|t| *t == header.media_type))
        else {
            tracing::debug!(content_type = %header.media_type, "No body decoder");
            return Ok(None);
        };
        decoder.decode(body, &header, encoding)
    }
}

impl std::fmt::Debug for BodyDecoderCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyDecoderCollection")
            .field("decoders", &self.decoders.len())
            .finish()
    }
}

/// `application/x-www-form-urlencoded`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlEncodedDecoder;

impl BodyDecoder for UrlEncodedDecoder {
    fn content_types(&self) -> &[&'static str] {
        &["application/x-www-form-urlencoded"]
    }

    fn decode(
        &self,
        body: &[u8],
        _content_type: &ContentTypeHeader,
        encoding: &str,
    ) -> Result<Option<DecodedData>, DecodeError> {
        if body.is_empty() {
            return Ok(None);
        }
        if !matches!(encoding, "utf-8" | "utf8" | "us-ascii" | "ascii") {
            return Err(DecodeError::UnsupportedEncoding(encoding.to_string()));
        }
        if std::str::from_utf8(body).is_err() {
            return Err(DecodeError::Malformed("body is not valid utf-8".to_string()));
        }

        let parameters = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(Some(DecodedData {
            parameters,
            files: Vec::new(),
        }))
    }
}
