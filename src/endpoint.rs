use std::fmt;
use std::path::Path;

use url::Url;

use crate::config::Credentials;
use crate::error::{MirrorError, Result};
use crate::secret::SecretString;

/// Destination of the mirror.
///
/// Holds only the credential-free URL. The credential-bearing form is built
/// on demand by [`RemoteEndpoint::authenticated_url`] and stays wrapped in a
/// [`SecretString`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    url: Url,
}

impl RemoteEndpoint {
    pub fn from_parts(scheme: &str, host: Option<&str>, path: &str) -> Result<Self> {
        match scheme {
            "https" | "http" => {
                let host = host
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| MirrorError::Config("destination host is not set".into()))?;
                if host.contains(['@', '/', '?', '#']) || host.contains(char::is_whitespace) {
                    return Err(MirrorError::InvalidUrl(format!(
                        "host '{host}' must be a bare host name"
                    )));
                }
                let path = path.trim_start_matches('/');
                if path.is_empty() {
                    return Err(MirrorError::Config("destination path is empty".into()));
                }
                let url = Url::parse(&format!("{scheme}://{host}/{path}"))
                    .map_err(|e| MirrorError::InvalidUrl(e.to_string()))?;
                Ok(Self { url })
            }
            "file" => {
                let url = Url::from_file_path(Path::new(path)).map_err(|()| {
                    MirrorError::InvalidUrl(format!("'{path}' is not an absolute path"))
                })?;
                Ok(Self { url })
            }
            other => Err(MirrorError::InvalidUrl(format!(
                "unsupported URL scheme: {other}"
            ))),
        }
    }

    /// URL without credentials; safe to log and to register as a remote.
    pub fn public_url(&self) -> &Url {
        &self.url
    }

    pub fn embeds_credentials(&self) -> bool {
        matches!(self.url.scheme(), "https" | "http")
    }

    /// `https://<handle>:<token>@<host>/<path>`, for handing to git only.
    ///
    /// Local `file` destinations have nowhere to put credentials and are
    /// returned unchanged.
    pub fn authenticated_url(&self, credentials: &Credentials) -> Result<SecretString> {
        if !self.embeds_credentials() {
            return Ok(SecretString::new(self.url.to_string()));
        }

        let mut url = self.url.clone();
        url.set_username(credentials.handle.expose())
            .map_err(|()| MirrorError::InvalidUrl("cannot set username on URL".into()))?;
        url.set_password(Some(credentials.token.expose()))
            .map_err(|()| MirrorError::InvalidUrl("cannot set password on URL".into()))?;
        Ok(SecretString::new(url.to_string()))
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
