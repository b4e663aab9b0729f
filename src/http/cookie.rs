//! Cookie header parsing.
//!
//! A header holds one or more comma-separated cookies. Each cookie is
//! `name[=value]` followed by `;`-separated attributes. Parsing is best
//! effort: a malformed cookie is skipped up to the next `,` and the rest of
//! the header is still read.

use std::fmt;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<SystemTime>,
    pub secure: bool,
    pub http_only: bool,
    pub discard: bool,
    pub version: Option<u32>,
    pub comment: Option<String>,
    pub comment_url: Option<String>,
    pub port: Option<String>,
    /// When the cookie was parsed. `Max-Age` is relative to this.
    pub timestamp: SystemTime,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            secure: false,
            http_only: false,
            discard: false,
            version: None,
            comment: None,
            comment_url: None,
            port: None,
            timestamp: SystemTime::now(),
        }
    }

    fn apply(&mut self, name: &str, value: &str) {
        match name.to_ascii_uppercase().as_str() {
            "COMMENT" => set_once(&mut self.comment, value),
            "COMMENTURL" => set_once(&mut self.comment_url, value),
            "DISCARD" => self.discard = true,
            "DOMAIN" => set_once(&mut self.domain, value),
            "HTTPONLY" => self.http_only = true,
            "MAX-AGE" => {
                if self.expires.is_none() {
                    if let Ok(secs) = value.parse::<u32>() {
                        self.expires = Some(self.timestamp + Duration::from_secs(secs.into()));
                    }
                }
            }
            "EXPIRES" => {
                if self.expires.is_none() {
                    self.expires = parse_expires(value);
                }
            }
            "PATH" => set_once(&mut self.path, value),
            "PORT" => set_once(&mut self.port, value),
            "SECURE" => self.secure = true,
            "VERSION" => {
                if self.version.is_none() {
                    self.version = value.parse().ok();
                }
            }
            _ => {}
        }
    }
}

/// `Set-Cookie` rendering: the value plus `expires` and `path` when present.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(expires) = self.expires {
            write!(f, ";expires={}", httpdate::fmt_http_date(expires))?;
        }
        if let Some(path) = &self.path {
            if !path.is_empty() {
                write!(f, ";path={path}")?;
            }
        }
        Ok(())
    }
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

#[derive(Debug)]
struct Malformed;

/// Parses every well-formed cookie in a `Cookie` header value.
pub fn parse_cookies(header: &str) -> Vec<Cookie> {
    CookieParser::new(header).collect()
}

/// Cursor over one header value. Yields cookies in order.
pub struct CookieParser<'a> {
    header: &'a str,
    pos: usize,
}

impl<'a> CookieParser<'a> {
    pub fn new(header: &'a str) -> Self {
        Self { header, pos: 0 }
    }

    fn byte(&self, at: usize) -> Option<u8> {
        self.header.as_bytes().get(at).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.header.len()
    }

    fn skip_to_next_cookie(&mut self) {
        while let Some(b) = self.byte(self.pos) {
            if b == b',' {
                break;
            }
            self.pos += 1;
        }
        self.pos += 1;
    }

    fn parse_one(&mut self) -> Result<Cookie, Malformed> {
        let name = self.read_name();
        if !valid_name(name) {
            return Err(Malformed);
        }

        let mut value = "";
        if self.byte(self.pos) == Some(b'=') {
            self.pos += 1;
            value = self.read_value()?;
        }
        let mut cookie = Cookie::new(name, value);

        match self.byte(self.pos) {
            None => return Ok(cookie),
            Some(b',') => {
                self.pos += 1;
                return Ok(cookie);
            }
            Some(b';') => self.pos += 1,
            Some(_) => return Ok(cookie),
        }

        while !self.at_end() {
            let attr = self.read_name();
            let mut attr_value = String::new();
            if self.byte(self.pos) == Some(b'=') {
                self.pos += 1;
                attr_value = self.read_value()?.to_string();
            }

            // Legacy `Expires=Wdy, DD-Mon-YY ...` dates contain a comma that
            // would otherwise end the cookie.
            if attr.eq_ignore_ascii_case("expires")
                && self.byte(self.pos) == Some(b',')
                && is_weekday(&attr_value)
            {
                self.pos += 1;
                let rest = self.read_value()?;
                attr_value = format!("{attr_value}, {rest}");
            }

            // Empty slots such as `a=1;; Path=/` carry nothing.
            if !attr.is_empty() {
                cookie.apply(attr, &attr_value);
            }

            match self.byte(self.pos) {
                Some(b',') => {
                    self.pos += 1;
                    break;
                }
                Some(b';') => self.pos += 1,
                _ => break,
            }
        }

        Ok(cookie)
    }

    fn read_name(&mut self) -> &'a str {
        let bytes = self.header.as_bytes();
        let mut k = self.pos;
        while k < bytes.len() && bytes[k].is_ascii_whitespace() {
            k += 1;
        }
        let begin = k;
        while k < bytes.len() && !matches!(bytes[k], b';' | b',' | b'=') {
            k += 1;
        }
        self.pos = k;
        self.header[begin..k].trim()
    }

    fn read_value(&mut self) -> Result<&'a str, Malformed> {
        let bytes = self.header.as_bytes();
        let mut k = self.pos;
        while k < bytes.len() && bytes[k].is_ascii_whitespace() {
            k += 1;
        }

        if bytes.get(k) == Some(&b'"') {
            let begin = k + 1;
            let close = bytes[begin..]
                .iter()
                .position(|&b| b == b'"')
                .map(|i| begin + i)
                .ok_or(Malformed)?;
            let mut j = close + 1;
            while j < bytes.len() && !matches!(bytes[j], b';' | b',') {
                j += 1;
            }
            self.pos = j;
            return Ok(&self.header[begin..close]);
        }

        let begin = k;
        while k < bytes.len() && !matches!(bytes[k], b';' | b',') {
            k += 1;
        }
        self.pos = k;
        Ok(self.header[begin..k].trim())
    }
}

impl Iterator for CookieParser<'_> {
    type Item = Cookie;

    fn next(&mut self) -> Option<Cookie> {
        while !self.at_end() {
            let start = self.pos;
            match self.parse_one() {
                Ok(cookie) => return Some(cookie),
                Err(Malformed) => {
                    tracing::debug!(at = start, "Skipping malformed cookie");
                    self.pos = start;
                    self.skip_to_next_cookie();
                }
            }
        }
        None
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('$')
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && b != b'"')
}

const WEEKDAYS: &[&str] = &[
    "mon", "tue", "wed", "thu", "fri", "sat", "sun", "monday", "tuesday", "wednesday",
    "thursday", "friday", "saturday", "sunday",
];

fn is_weekday(value: &str) -> bool {
    WEEKDAYS.iter().any(|d| value.eq_ignore_ascii_case(d))
}

const MONTHS: &[&str] = &[
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parses an `Expires` value. Accepts RFC 1123 dates and the legacy
/// `Wdy, DD-Mon-YYYY HH:MM:SS GMT` / `Wdy, DD-Mon-YY HH:MM:SS GMT` forms.
/// Anything else means no expiry.
pub fn parse_expires(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(t) = httpdate::parse_http_date(value) {
        return Some(t);
    }

    // `Wdy, DD-Mon-YY[YY] HH:MM:SS GMT` -> `Wdy, DD Mon YYYY HH:MM:SS GMT`
    let (weekday, rest) = value.split_once(',')?;
    let mut parts = rest.trim().splitn(2, ' ');
    let date = parts.next()?;
    let time = parts.next()?;

    let mut fields = date.split('-');
    let day = fields.next()?;
    let month = fields.next()?;
    let year = fields.next()?;
    if fields.next().is_some() || !MONTHS.iter().any(|m| m.eq_ignore_ascii_case(month)) {
        return None;
    }
    let year: u32 = match year.len() {
        2 => {
            let yy: u32 = year.parse().ok()?;
            if yy < 70 { 2000 + yy } else { 1900 + yy }
        }
        4 => year.parse().ok()?,
        _ => return None,
    };

    let weekday = weekday.trim();
    let short_weekday = weekday.get(..3)?;
    let normalized = format!("{short_weekday}, {day:0>2} {month} {year} {}", time.trim());
    httpdate::parse_http_date(&normalized).ok()
}
