//! Synchronous request execution on top of a configured `ureq` agent.
//!
//! # Design
//! The agent is configured once: redirects are not followed (callers must
//! observe 3xx explicitly), non-2xx statuses come back as data rather than
//! errors (status interpretation belongs to the operations, not the
//! transport), and gzip/deflate transfer compression is decompressed
//! transparently by ureq. A `RequestSpec` is consumed per call, so no query
//! parameter or body state survives a `send`. Executors clone cheaply and
//! clones share the underlying connection pool; each logical client owns its
//! own handle instead of going through a process-wide singleton.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::time::Duration;

use ureq::{Agent, SendBody};

use crate::error::{Result, StorageError};
use crate::http::{Body, Method, RequestSpec, ResponseEnvelope};

/// Builds and sends a single HTTP request, blocking until the response is
/// fully received.
#[derive(Clone, Debug)]
pub struct RequestExecutor {
    agent: Agent,
    timeout: Option<Duration>,
}

impl RequestExecutor {
    /// Executor with the transport default timeout (none).
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// Executor whose requests time out after `timeout`, unless a spec
    /// carries its own override.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            agent: build_agent(timeout),
            timeout,
        }
    }

    /// Send one request and parse the response into an envelope.
    ///
    /// Method selection shapes the request: GET/HEAD append the pending
    /// query parameters to the URL and drop the body, POST form-encodes the
    /// parameters into the body, PUT sends the body with its length declared
    /// up front, and any other verb (`COPY` included) goes out verbatim.
    pub fn send(&self, spec: RequestSpec) -> Result<ResponseEnvelope> {
        let RequestSpec {
            method,
            url,
            headers,
            query,
            body,
            timeout,
        } = spec;

        let url = match method {
            Method::Get | Method::Head => append_query(&url, &query),
            _ => url,
        };
        let form = match method {
            Method::Post if !query.is_empty() => Some(form_encode(&query)),
            _ => None,
        };

        let mut implicit: Vec<(String, String)> = Vec::new();
        let send_body: SendBody = match (&method, form, body) {
            (Method::Get | Method::Head, _, _) => SendBody::none(),
            (Method::Post, Some(encoded), _) => {
                implicit.push((
                    "Content-Type".into(),
                    "application/x-www-form-urlencoded".into(),
                ));
                implicit.push(("Content-Length".into(), encoded.len().to_string()));
                SendBody::from_owned_reader(Cursor::new(encoded.into_bytes()))
            }
            (_, _, Body::Bytes(bytes)) => {
                implicit.push(("Content-Length".into(), bytes.len().to_string()));
                SendBody::from_owned_reader(Cursor::new(bytes))
            }
            (_, _, Body::File(path)) => {
                let file = File::open(&path)?;
                let len = file.metadata()?.len();
                implicit.push(("Content-Length".into(), len.to_string()));
                SendBody::from_owned_reader(file)
            }
            (Method::Put, _, Body::Empty) => {
                implicit.push(("Content-Length".into(), "0".into()));
                SendBody::none()
            }
            _ => SendBody::none(),
        };

        log::debug!("{} {}", method.as_str(), url);

        let mut builder = ureq::http::Request::builder()
            .method(method.as_str())
            .uri(&url);
        for (name, value) in implicit.iter().chain(headers.iter()) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder
            .body(send_body)
            .map_err(|e| StorageError::Protocol(format!("invalid request: {e}")))?;

        // A per-spec timeout gets a dedicated agent; the shared pool keeps
        // the configured default otherwise.
        let scoped;
        let agent = match timeout {
            Some(_) if timeout != self.timeout => {
                scoped = build_agent(timeout);
                &scoped
            }
            _ => &self.agent,
        };

        let mut response = agent.run(request)?;
        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            headers.insert(
                name.as_str().to_ascii_lowercase(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        let mut body = Vec::new();
        response
            .body_mut()
            .as_reader()
            .read_to_end(&mut body)
            .map_err(|e| StorageError::Transport(format!("reading response body: {e}")))?;

        log::debug!("{} {} -> {} ({} bytes)", method.as_str(), url, status, body.len());

        Ok(ResponseEnvelope {
            status,
            headers,
            body,
        })
    }
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn build_agent(timeout: Option<Duration>) -> Agent {
    Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(0)
        .allow_non_standard_methods(true)
        .timeout_global(timeout)
        .build()
        .new_agent()
}

fn append_query(url: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let encoded = form_encode(query);
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}{encoded}")
}

fn form_encode(query: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}
