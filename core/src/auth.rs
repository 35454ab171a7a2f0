//! Account authentication handshake.
//!
//! # Design
//! One GET against the auth endpoint, one attempt, no refresh. The session
//! that comes back is an immutable pair of storage URL and token; every
//! subsequent operation attaches the token as `X-Auth-Token`. A success
//! response missing either expected header is a protocol-contract violation
//! and fails loudly instead of proceeding with empty values.

use url::Url;

use crate::error::{Result, StorageError};
use crate::executor::RequestExecutor;
use crate::http::{Method, RequestSpec};

/// Storage endpoint and auth token obtained from the handshake.
#[derive(Debug, Clone)]
pub struct AuthSession {
    storage_url: String,
    token: String,
}

impl AuthSession {
    /// Authenticate `user` against `auth_url`.
    ///
    /// Success is HTTP 204 carrying `x-storage-url` and `x-storage-token`.
    /// 403 maps to `Forbidden`, any other status to `Auth`.
    pub fn authenticate(
        executor: &RequestExecutor,
        auth_url: &str,
        user: &str,
        key: &str,
    ) -> Result<AuthSession> {
        let parsed = Url::parse(auth_url)
            .map_err(|e| StorageError::Protocol(format!("invalid auth url '{auth_url}': {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| StorageError::Protocol(format!("auth url '{auth_url}' has no host")))?;

        let spec = RequestSpec::new(Method::Get, auth_url)
            .header("Host", host)
            .header("X-Auth-User", user)
            .header("X-Auth-Key", key);
        let response = executor.send(spec)?;

        match response.status {
            204 => {}
            403 => {
                return Err(StorageError::Forbidden {
                    user: user.to_string(),
                })
            }
            code => return Err(StorageError::Auth { code }),
        }

        let storage_url = response
            .header("x-storage-url")
            .ok_or_else(|| StorageError::Protocol("auth response missing x-storage-url".into()))?;
        let token = response
            .header("x-storage-token")
            .ok_or_else(|| StorageError::Protocol("auth response missing x-storage-token".into()))?;

        log::debug!("authenticated user '{user}', storage at {storage_url}");

        Ok(AuthSession {
            storage_url: ensure_trailing_slash(storage_url),
            token: token.to_string(),
        })
    }

    /// Storage root URL, always ending in `/`.
    pub fn storage_url(&self) -> &str {
        &self.storage_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The `X-Auth-Token` header every authenticated operation carries.
    pub(crate) fn token_header(&self) -> (String, String) {
        ("X-Auth-Token".to_string(), self.token.clone())
    }
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}
