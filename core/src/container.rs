//! Container-scope operations.
//!
//! # Design
//! A `ContainerClient` operates on `storage_url + name + "/"` with its own
//! executor and session clones; it is built by `AccountClient::container`
//! (or `create_container`), never by inheriting account behaviour. The
//! descriptor fetched at open time is cached until `refresh_info`.

use std::collections::HashMap;
use std::path::Path;

use url::Url;

use crate::auth::AuthSession;
use crate::error::{Result, StorageError};
use crate::executor::RequestExecutor;
use crate::http::{prefixed_headers, Body, Format, Listing, Method, RequestSpec, ResponseEnvelope};
use crate::signer;

/// A container's identity and its `x-`-prefixed metadata from the last HEAD.
#[derive(Debug, Clone)]
pub struct ContainerDescriptor {
    pub name: String,
    pub url: String,
    pub metadata: HashMap<String, String>,
}

/// Parameters for a file listing. `limit`, `marker` and `format` are always
/// sent; the rest only when set.
#[derive(Debug, Clone)]
pub struct ListFiles {
    pub limit: u32,
    pub marker: String,
    pub prefix: Option<String>,
    pub path: Option<String>,
    pub delimiter: Option<String>,
    pub format: Option<Format>,
}

impl Default for ListFiles {
    fn default() -> Self {
        Self {
            limit: 10_000,
            marker: String::new(),
            prefix: None,
            path: None,
            delimiter: None,
            format: None,
        }
    }
}

/// Client for object operations inside one container.
#[derive(Clone, Debug)]
pub struct ContainerClient {
    executor: RequestExecutor,
    session: AuthSession,
    base_url: String,
    format: Format,
    info: ContainerDescriptor,
}

impl ContainerClient {
    /// HEAD the container and build a client with its descriptor populated.
    pub(crate) fn open(
        executor: RequestExecutor,
        session: AuthSession,
        name: &str,
        format: Format,
    ) -> Result<ContainerClient> {
        let base_url = format!("{}{name}/", session.storage_url());
        let spec = Self::token_request(&session, Method::Head, &base_url);
        let response = executor.send(spec)?;
        response.expect_status(&[204], "get_container")?;

        let info = ContainerDescriptor {
            name: name.to_string(),
            url: base_url.clone(),
            metadata: prefixed_headers(&response.headers, "x-"),
        };
        Ok(ContainerClient {
            executor,
            session,
            base_url,
            format,
            info,
        })
    }

    /// Cached descriptor from the last HEAD.
    pub fn info(&self) -> &ContainerDescriptor {
        &self.info
    }

    /// Re-HEAD the container and replace the cached descriptor.
    pub fn refresh_info(&mut self) -> Result<&ContainerDescriptor> {
        let spec = self.request(Method::Head, self.base_url.clone());
        let response = self.executor.send(spec)?;
        response.expect_status(&[204], "refresh_info")?;
        self.info.metadata = prefixed_headers(&response.headers, "x-");
        Ok(&self.info)
    }

    /// List object names (plain format) or the raw formatted payload.
    pub fn list_files(&self, opts: &ListFiles) -> Result<Listing> {
        let format = opts.format.unwrap_or(self.format);
        let mut spec = self
            .request(Method::Get, self.base_url.clone())
            .query("limit", opts.limit.to_string())
            .query("marker", opts.marker.as_str())
            .query("format", format.query_value());
        if let Some(prefix) = &opts.prefix {
            spec = spec.query("prefix", prefix.as_str());
        }
        if let Some(path) = &opts.path {
            spec = spec.query("path", path.as_str());
        }
        if let Some(delimiter) = &opts.delimiter {
            spec = spec.query("delimiter", delimiter.as_str());
        }
        let response = self.executor.send(spec)?;
        response.expect_status(&[200], "list_files")?;
        Ok(Listing::from_body(format, &response.body))
    }

    /// Metadata record for one object, from a single-entry json listing.
    ///
    /// An empty or absent listing yields an empty map, not an error.
    pub fn file_info(&self, name: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
        let listing = self.list_files(&ListFiles {
            limit: 1,
            prefix: Some(name.to_string()),
            format: Some(Format::Json),
            ..ListFiles::default()
        })?;
        let raw = match listing {
            Listing::Raw(raw) => raw,
            Listing::Names(_) => unreachable!("json listing is always raw"),
        };
        let records: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(&raw).map_err(|e| {
                StorageError::Protocol(format!("object listing is not valid json: {e}"))
            })?;
        Ok(records.into_iter().next().unwrap_or_default())
    }

    /// GET an object. Caller-supplied conditional headers (`If-Match`,
    /// `If-None-Match`, `If-Modified-Since`, `If-Unmodified-Since`) are sent
    /// as given; the envelope comes back whatever the status, body
    /// undecoded.
    pub fn get_file(
        &self,
        name: &str,
        conditional_headers: &[(String, String)],
    ) -> Result<ResponseEnvelope> {
        let spec = self
            .request(Method::Get, format!("{}{name}", self.base_url))
            .headers(conditional_headers);
        self.executor.send(spec)
    }

    /// Upload a local file, streaming from the descriptor. The remote name
    /// defaults to the final path segment of `local_path`.
    pub fn put_file(
        &self,
        local_path: &Path,
        remote_name: Option<&str>,
        extra_headers: &[(String, String)],
    ) -> Result<ResponseEnvelope> {
        let remote_name = match remote_name {
            Some(name) => name.to_string(),
            None => remote_name_from(local_path)?,
        };
        let spec = self
            .request(Method::Put, format!("{}{remote_name}", self.base_url))
            .headers(extra_headers)
            .body(Body::File(local_path.to_path_buf()));
        let response = self.executor.send(spec)?;
        response.expect_status(&[201], "put_file")?;
        Ok(response)
    }

    /// Upload an in-memory buffer as an object.
    pub fn put_file_contents(&self, contents: Vec<u8>, remote_name: &str) -> Result<ResponseEnvelope> {
        let spec = self
            .request(Method::Put, format!("{}{remote_name}", self.base_url))
            .body(Body::Bytes(contents));
        let response = self.executor.send(spec)?;
        response.expect_status(&[201], "put_file_contents")?;
        Ok(response)
    }

    /// Create a directory marker: a zero-length object with
    /// `Content-Type: application/directory`.
    pub fn create_directory(&self, name: &str) -> Result<ResponseEnvelope> {
        let spec = self
            .request(Method::Put, format!("{}{name}", self.base_url))
            .header("Content-Type", "application/directory");
        let response = self.executor.send(spec)?;
        response.expect_status(&[201, 202], "create_directory")?;
        Ok(response)
    }

    /// Create a symlink object pointing at `target_path` in this container.
    /// The link is resolved server-side via `X-Object-Meta-Location`.
    pub fn create_link(&self, link_path: &str, target_path: &str) -> Result<u16> {
        let container_path = self.container_path()?;
        let spec = self
            .request(Method::Put, format!("{}{link_path}", self.base_url))
            .header("Content-Type", "x-storage/symlink")
            .header("X-Object-Meta-Location", format!("{container_path}{target_path}"));
        let response = self.executor.send(spec)?;
        response.expect_status(&[201], "create_link")?;
        Ok(response.status)
    }

    /// POST object metadata; only `X-Object-Meta-`-prefixed headers are
    /// sent, anything else is dropped.
    pub fn set_file_metadata(&self, name: &str, headers: &[(String, String)]) -> Result<u16> {
        let meta: Vec<(String, String)> = headers
            .iter()
            .filter(|(n, _)| n.to_ascii_lowercase().starts_with("x-object-meta-"))
            .cloned()
            .collect();
        let spec = self
            .request(Method::Post, format!("{}{name}", self.base_url))
            .headers(&meta);
        let response = self.executor.send(spec)?;
        response.expect_status(&[204], "set_file_metadata")?;
        Ok(response.status)
    }

    /// Signed, time-limited download URL for one object in this container.
    pub fn temp_url(
        &self,
        key: &str,
        object_path: &str,
        expires: u64,
        filename: Option<&str>,
    ) -> Result<String> {
        signer::build_temp_url(&self.base_url, object_path, key, expires, filename)
    }

    fn request(&self, method: Method, url: impl Into<String>) -> RequestSpec {
        Self::token_request(&self.session, method, url)
    }

    fn token_request(session: &AuthSession, method: Method, url: impl Into<String>) -> RequestSpec {
        let (name, value) = session.token_header();
        RequestSpec::new(method, url).header(name, value)
    }

    fn container_path(&self) -> Result<String> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|e| StorageError::Protocol(format!("invalid container url: {e}")))?;
        Ok(parsed.path().to_string())
    }
}

fn remote_name_from(local_path: &Path) -> Result<String> {
    local_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot derive remote name from '{}'", local_path.display()),
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_name_is_the_final_path_segment() {
        assert_eq!(
            remote_name_from(Path::new("/tmp/uploads/report.pdf")).unwrap(),
            "report.pdf"
        );
        assert_eq!(remote_name_from(Path::new("plain.txt")).unwrap(), "plain.txt");
    }

    #[test]
    fn remote_name_fails_for_a_bare_root() {
        assert!(remote_name_from(Path::new("/")).is_err());
    }

    #[test]
    fn list_files_defaults() {
        let opts = ListFiles::default();
        assert_eq!(opts.limit, 10_000);
        assert_eq!(opts.marker, "");
        assert!(opts.prefix.is_none() && opts.path.is_none() && opts.delimiter.is_none());
    }
}
