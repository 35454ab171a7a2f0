//! Account-scope operations.
//!
//! # Design
//! An `AccountClient` owns a `RequestExecutor` handle and an `AuthSession`,
//! and composes with `ContainerClient` (which gets clones of both) instead
//! of sharing state through inheritance or a singleton. Every operation
//! builds a fresh `RequestSpec` and checks the remote status against the
//! operation's documented success code.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;

use crate::auth::AuthSession;
use crate::container::ContainerClient;
use crate::error::{Result, StorageError};
use crate::executor::RequestExecutor;
use crate::http::{prefixed_headers, Body, Format, Listing, Method, RequestSpec, ResponseEnvelope};

/// Result of a server-side archive extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveExtraction {
    /// Plain format: one created name per line.
    Names(Vec<String>),
    /// Json format: the decoded report.
    Json(serde_json::Value),
    /// Xml format: the trimmed raw payload.
    Raw(String),
}

/// Client for account-level operations: container management, account
/// metadata and the temp-URL key.
#[derive(Clone)]
pub struct AccountClient {
    executor: RequestExecutor,
    session: AuthSession,
    format: Format,
}

impl AccountClient {
    pub fn new(executor: RequestExecutor, session: AuthSession) -> Self {
        Self {
            executor,
            session,
            format: Format::default(),
        }
    }

    /// Default listing format used when an operation is not given one.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// HEAD on the storage root; returns the `x-`-prefixed account headers.
    pub fn account_info(&self) -> Result<HashMap<String, String>> {
        let spec = self.request(Method::Head, self.session.storage_url());
        let response = self.executor.send(spec)?;
        response.expect_status(&[204], "account_info")?;
        Ok(prefixed_headers(&response.headers, "x-"))
    }

    /// List container names (plain format) or the raw formatted payload.
    pub fn list_containers(
        &self,
        limit: u32,
        marker: &str,
        format: Option<Format>,
    ) -> Result<Listing> {
        let format = format.unwrap_or(self.format);
        let spec = self
            .request(Method::Get, self.session.storage_url())
            .query("limit", limit.to_string())
            .query("marker", marker)
            .query("format", format.query_value());
        let response = self.executor.send(spec)?;
        response.expect_status(&[200], "list_containers")?;
        Ok(Listing::from_body(format, &response.body))
    }

    /// Create a container, then fetch its descriptor with a HEAD round-trip.
    ///
    /// `extra_headers` (e.g. `X-Container-Meta-*`) are sent with the PUT.
    pub fn create_container(
        &self,
        name: &str,
        extra_headers: &[(String, String)],
    ) -> Result<ContainerClient> {
        let spec = self
            .request(Method::Put, format!("{}{name}", self.session.storage_url()))
            .headers(extra_headers);
        let response = self.executor.send(spec)?;
        response.expect_status(&[201, 202], "create_container")?;
        self.container(name)
    }

    /// Open an existing container; fails with the remote status if it does
    /// not exist.
    pub fn container(&self, name: &str) -> Result<ContainerClient> {
        ContainerClient::open(
            self.executor.clone(),
            self.session.clone(),
            name,
            self.format,
        )
    }

    /// Delete an empty container, or an object addressed relative to the
    /// storage root (`container/object`).
    pub fn delete(&self, name: &str) -> Result<ResponseEnvelope> {
        let spec = self.request(
            Method::Delete,
            format!("{}{name}", self.session.storage_url()),
        );
        let response = self.executor.send(spec)?;
        response.expect_status(&[204], "delete")?;
        Ok(response)
    }

    /// Server-side copy via the `COPY` verb and a `Destination` header built
    /// from the storage URL's path component.
    pub fn copy(&self, origin: &str, destination: &str) -> Result<ResponseEnvelope> {
        let destination = format!("{}{destination}", self.storage_path()?);
        let spec = self
            .request(
                Method::Other("COPY".to_string()),
                format!("{}{origin}", self.session.storage_url()),
            )
            .header("Destination", destination);
        self.executor.send(spec)
    }

    /// Configure the account temp-URL key. Must be set once before temp URLs
    /// generated with that key validate on the remote side.
    pub fn set_temp_url_key(&self, key: &str) -> Result<u16> {
        let spec = self
            .request(Method::Post, self.session.storage_url())
            .header("X-Account-Meta-Temp-URL-Key", key);
        let response = self.executor.send(spec)?;
        response.expect_status(&[202], "set_temp_url_key")?;
        Ok(response.status)
    }

    /// POST container metadata; only `X-Container-Meta-`-prefixed headers
    /// are sent, anything else is dropped.
    pub fn set_container_metadata(
        &self,
        name: &str,
        headers: &[(String, String)],
    ) -> Result<u16> {
        let meta: Vec<(String, String)> = headers
            .iter()
            .filter(|(n, _)| n.to_ascii_lowercase().starts_with("x-container-meta-"))
            .cloned()
            .collect();
        let spec = self
            .request(Method::Post, format!("{}{name}", self.session.storage_url()))
            .headers(&meta);
        let response = self.executor.send(spec)?;
        response.expect_status(&[204], "set_container_metadata")?;
        Ok(response.status)
    }

    /// Upload a local archive and have the server extract it under
    /// `extract_path`. The archive kind is taken from the file extension.
    pub fn put_archive(
        &self,
        local_path: &Path,
        extract_path: &str,
        format: Option<Format>,
    ) -> Result<ArchiveExtraction> {
        let format = format.unwrap_or(self.format);
        let ext = archive_ext(local_path);
        let url = format!(
            "{}{extract_path}?extract-archive={ext}",
            self.session.storage_url()
        );
        let spec = self
            .request(Method::Put, url)
            .header("Accept", format.accept())
            .body(Body::File(local_path.to_path_buf()));
        let response = self.executor.send(spec)?;
        response.expect_status(&[200, 201], "put_archive")?;

        match format {
            Format::Plain => match Listing::from_body(Format::Plain, &response.body) {
                Listing::Names(names) => Ok(ArchiveExtraction::Names(names)),
                Listing::Raw(_) => unreachable!("plain listing is always names"),
            },
            Format::Json => serde_json::from_slice(&response.body)
                .map(ArchiveExtraction::Json)
                .map_err(|e| {
                    StorageError::Protocol(format!("extraction report is not valid json: {e}"))
                }),
            Format::Xml => Ok(ArchiveExtraction::Raw(response.body_str().trim().to_string())),
        }
    }

    fn request(&self, method: Method, url: impl Into<String>) -> RequestSpec {
        let (name, value) = self.session.token_header();
        RequestSpec::new(method, url).header(name, value)
    }

    fn storage_path(&self) -> Result<String> {
        let parsed = url::Url::parse(self.session.storage_url())
            .map_err(|e| StorageError::Protocol(format!("invalid storage url: {e}")))?;
        Ok(parsed.path().to_string())
    }
}

fn archive_ext(path: &Path) -> String {
    path.extension()
        .and_then(OsStr::to_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_ext_comes_from_the_file_name() {
        assert_eq!(archive_ext(Path::new("/tmp/bundle.tar")), "tar");
        assert_eq!(archive_ext(Path::new("backup.tar.gz")), "gz");
        assert_eq!(archive_ext(Path::new("no-extension")), "");
    }
}
