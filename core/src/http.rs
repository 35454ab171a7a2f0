//! Plain-data HTTP request and response types.
//!
//! # Design
//! A `RequestSpec` is built fresh for every operation and consumed by
//! `RequestExecutor::send`, so query parameters and bodies can never leak
//! from one call into the next. A `ResponseEnvelope` is the parsed result:
//! status code, lower-cased header map and raw body bytes. Both sides use
//! owned types so specs and envelopes can be moved around freely.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StorageError};

/// HTTP method for a request.
///
/// `Other` carries non-standard verbs (`COPY`) through to the wire verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Other(name) => name,
        }
    }
}

/// Request body source.
///
/// `File` bodies are streamed from the open descriptor with the length
/// declared up front, so large uploads are never buffered in memory.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// A single HTTP request described as plain data.
///
/// Built by the client operations and consumed by `RequestExecutor::send`.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Body,
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: Body::Empty,
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(mut self, headers: &[(String, String)]) -> Self {
        self.headers.extend(headers.iter().cloned());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A parsed HTTP response: status code, lower-cased headers, raw body.
///
/// Header names are lower-cased on parse; duplicate names keep the
/// last-seen value.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ResponseEnvelope {
    /// Look up a header by its lower-cased name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Body as UTF-8, lossy.
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Fail with `UnexpectedStatus` unless the status is one of `accepted`.
    pub fn expect_status(&self, accepted: &[u16], operation: &'static str) -> Result<&Self> {
        if accepted.contains(&self.status) {
            Ok(self)
        } else {
            Err(StorageError::UnexpectedStatus {
                operation,
                code: self.status,
            })
        }
    }

    /// Parse a raw response (status line, header block, blank line, body).
    ///
    /// The split happens at the *first* blank line; a blank line inside the
    /// body is kept as body content. The 3-digit code is extracted from the
    /// `HTTP/<version> <code> ...` status line.
    pub fn parse(raw: &[u8]) -> Result<ResponseEnvelope> {
        let (head, body) = split_head_body(raw);
        let head = String::from_utf8_lossy(head);
        let mut lines = head.split("\r\n").flat_map(|l| l.split('\n'));

        let status_line = lines
            .next()
            .ok_or_else(|| StorageError::Protocol("empty response head".into()))?;
        let status = parse_status_line(status_line)?;

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        Ok(ResponseEnvelope {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

fn split_head_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find(raw, b"\r\n\r\n") {
        (&raw[..pos], &raw[pos + 4..])
    } else if let Some(pos) = find(raw, b"\n\n") {
        (&raw[..pos], &raw[pos + 2..])
    } else {
        (raw, &[])
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_status_line(line: &str) -> Result<u16> {
    if !line.starts_with("HTTP") {
        return Err(StorageError::Protocol(format!(
            "malformed status line: {line:?}"
        )));
    }
    line.split_whitespace()
        .find_map(|token| {
            (token.len() == 3 && token.bytes().all(|b| b.is_ascii_digit()))
                .then(|| token.parse().ok())
                .flatten()
        })
        .ok_or_else(|| StorageError::Protocol(format!("no status code in line: {line:?}")))
}

/// Listing output format requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Newline-delimited plain names (the `format=` query value is empty).
    #[default]
    Plain,
    Json,
    Xml,
}

impl Format {
    pub fn query_value(&self) -> &'static str {
        match self {
            Format::Plain => "",
            Format::Json => "json",
            Format::Xml => "xml",
        }
    }

    pub fn accept(&self) -> &'static str {
        match self {
            Format::Plain => "text/plain",
            Format::Json => "application/json",
            Format::Xml => "application/xml",
        }
    }
}

/// Result of a listing operation.
///
/// Plain listings are split into names client-side; json/xml payloads are
/// returned trimmed but unparsed — the output format is the caller's choice,
/// not something the client re-interprets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Names(Vec<String>),
    Raw(String),
}

impl Listing {
    pub fn from_body(format: Format, body: &[u8]) -> Listing {
        let text = String::from_utf8_lossy(body);
        let trimmed = text.trim();
        match format {
            Format::Plain => Listing::Names(
                trimmed
                    .lines()
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            Format::Json | Format::Xml => Listing::Raw(trimmed.to_string()),
        }
    }

    /// Names for plain listings, `None` for raw payloads.
    pub fn names(&self) -> Option<&[String]> {
        match self {
            Listing::Names(names) => Some(names),
            Listing::Raw(_) => None,
        }
    }
}

/// Select the headers whose name starts with `prefix` (case-insensitive).
///
/// The storage service persists free-form metadata as `x-`-prefixed headers;
/// `x-` selects all of them, `x-container-meta-` only the custom subset.
pub fn prefixed_headers(
    headers: &HashMap<String, String>,
    prefix: &str,
) -> HashMap<String, String> {
    let prefix = prefix.to_ascii_lowercase();
    headers
        .iter()
        .filter(|(name, _)| name.to_ascii_lowercase().starts_with(&prefix))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
