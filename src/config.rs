//! Run configuration.
//!
//! Values are layered: an optional TOML file first, then CLI flags / runner
//! environment on top. Credentials never come from the file; they are read
//! from `VAR` or `VAR_FILE` at the start of a run.

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;
use tracing::debug;

use crate::endpoint::RemoteEndpoint;
use crate::error::{MirrorError, Result};
use crate::secret::SecretString;

pub const DEFAULT_SCHEME: &str = "https";
pub const DEFAULT_REMOTE_NAME: &str = "mirror";
pub const DEFAULT_PRIMARY_BRANCH: &str = "main";
pub const DEFAULT_IDENTITY_EMAIL: &str = "mirror@users.noreply.localhost";
pub const DEFAULT_HANDLE_VAR: &str = "MIRROR_HANDLE";
pub const DEFAULT_TOKEN_VAR: &str = "MIRROR_TOKEN";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub destination: DestinationSection,
    pub trigger: TriggerSection,
    pub identity: IdentitySection,
    pub credentials: CredentialsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationSection {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub remote_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerSection {
    pub primary_branch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentitySection {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Names of the environment variables holding the credential pair.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsSection {
    pub handle_var: Option<String>,
    pub token_var: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|source| MirrorError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Flag / environment values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub remote_name: Option<String>,
    pub primary_branch: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub endpoint: RemoteEndpoint,
    pub remote_name: String,
    pub primary_branch: String,
    pub identity_name: Option<String>,
    pub identity_email: String,
    pub handle_var: String,
    pub token_var: String,
}

impl MirrorConfig {
    pub fn resolve(file: FileConfig, overrides: ConfigOverrides) -> Result<Self> {
        let scheme = overrides
            .scheme
            .or(file.destination.scheme)
            .unwrap_or_else(|| DEFAULT_SCHEME.to_string());
        let host = overrides.host.or(file.destination.host);
        let path = overrides
            .path
            .or(file.destination.path)
            .ok_or_else(|| MirrorError::Config("destination path is not set".into()))?;

        let endpoint = RemoteEndpoint::from_parts(&scheme, host.as_deref(), &path)?;

        let remote_name = overrides
            .remote_name
            .or(file.destination.remote_name)
            .unwrap_or_else(|| DEFAULT_REMOTE_NAME.to_string());
        validate_name("remote name", &remote_name)?;

        let primary_branch = overrides
            .primary_branch
            .or(file.trigger.primary_branch)
            .unwrap_or_else(|| DEFAULT_PRIMARY_BRANCH.to_string());
        validate_name("primary branch", &primary_branch)?;

        debug!(
            destination = %endpoint,
            remote = %remote_name,
            primary_branch = %primary_branch,
            "resolved configuration"
        );

        Ok(Self {
            endpoint,
            remote_name,
            primary_branch,
            identity_name: file.identity.name,
            identity_email: file
                .identity
                .email
                .unwrap_or_else(|| DEFAULT_IDENTITY_EMAIL.to_string()),
            handle_var: file
                .credentials
                .handle_var
                .unwrap_or_else(|| DEFAULT_HANDLE_VAR.to_string()),
            token_var: file
                .credentials
                .token_var
                .unwrap_or_else(|| DEFAULT_TOKEN_VAR.to_string()),
        })
    }
}

fn validate_name(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(MirrorError::Config(format!("{what} is empty")));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(MirrorError::Config(format!(
            "{what} '{value}' contains whitespace"
        )));
    }
    Ok(())
}

/// The account handle and access token used to reach the destination.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub handle: SecretString,
    pub token: SecretString,
}

impl Credentials {
    pub fn from_env(handle_var: &str, token_var: &str) -> Result<Self> {
        Self::load_with(handle_var, token_var, |var| env::var(var).ok())
    }

    /// Like [`Credentials::from_env`] but with an injectable variable lookup.
    pub fn load_with(
        handle_var: &str,
        token_var: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let handle = require_secret(handle_var, &lookup)?;
        let token = require_secret(token_var, &lookup)?;
        validate_credential(handle_var, &handle)?;
        validate_credential(token_var, &token)?;
        Ok(Self { handle, token })
    }
}

fn require_secret(var: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<SecretString> {
    load_secret(var, lookup)?.ok_or_else(|| MirrorError::MissingCredential {
        var: var.to_string(),
    })
}

/// Loads a secret using the `VAR` / `VAR_FILE` convention.
///
/// `VAR_FILE` wins when both are set. A single trailing newline is stripped
/// from file contents.
pub fn load_secret(
    var: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<SecretString>> {
    let file_var = format!("{var}_FILE");

    if let Some(path_str) = lookup(&file_var) {
        if path_str.is_empty() {
            return Err(MirrorError::Config(format!("{file_var} is set but empty")));
        }
        let path = PathBuf::from(&path_str);
        let content = fs::read_to_string(&path).map_err(|source| MirrorError::SecretFile {
            path: path.clone(),
            source,
        })?;
        let value = content.strip_suffix('\n').unwrap_or(&content).to_string();
        return Ok(Some(SecretString::new(value)));
    }

    Ok(lookup(var).map(SecretString::new))
}

fn validate_credential(var: &str, value: &SecretString) -> Result<()> {
    let raw = value.expose();
    let reason = if raw.is_empty() {
        "value is empty"
    } else if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        "value contains whitespace or control characters"
    } else {
        return Ok(());
    };
    Err(MirrorError::InvalidCredential {
        var: var.to_string(),
        reason: reason.to_string(),
    })
}
