// gitoxide has no push support yet, so anything that talks to the
// destination goes through the git binary. Read-only inspection uses gix.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{trace, warn};

use crate::error::{MirrorError, Result};
use crate::secret::{SecretString, redact};

/// Committer identity handed to git so it stops complaining about a
/// missing `user.name` / `user.email`. Never used to author commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
    email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let email = email.into();
        validate_identity_part("name", &name)?;
        validate_identity_part("email", &email)?;
        if !email.contains('@') {
            return Err(MirrorError::Identity(format!(
                "email '{email}' has no '@'"
            )));
        }
        Ok(Self { name, email })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

fn validate_identity_part(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MirrorError::Identity(format!("{what} is empty")));
    }
    if value.contains(['<', '>', '\n', '\r', '\0']) {
        return Err(MirrorError::Identity(format!(
            "{what} contains a forbidden character"
        )));
    }
    Ok(())
}

/// Runs git commands against one working directory.
///
/// The identity is applied with `-c` overrides on every invocation, so no
/// configuration file is written. Registered secrets are scrubbed from
/// every argument and stderr line before it is logged or returned.
#[derive(Debug, Clone)]
pub struct Git {
    repo: PathBuf,
    identity: Option<Identity>,
    secrets: Vec<SecretString>,
}

impl Git {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            identity: None,
            secrets: Vec::new(),
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_secret(mut self, secret: SecretString) -> Self {
        self.secrets.push(secret);
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn redact(&self, text: &str) -> String {
        let secrets: Vec<&SecretString> = self.secrets.iter().collect();
        redact(text, &secrets)
    }

    /// Runs `git <args>` and returns trimmed stdout.
    pub fn run(&self, args: &[&str]) -> Result<String> {
        let display_args = self.redact(&args.join(" "));
        trace!(
            cmd = %format!("git -C {} {}", self.repo.display(), display_args),
            "running git command"
        );

        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.repo);
        if let Some(identity) = &self.identity {
            cmd.arg("-c")
                .arg(format!("user.name={}", identity.name))
                .arg("-c")
                .arg(format!("user.email={}", identity.email));
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GCM_INTERACTIVE", "never");

        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                warn!("git not found in PATH");
                MirrorError::GitNotInstalled
            } else {
                MirrorError::Io(e)
            }
        })?;

        let stderr = self.redact(String::from_utf8_lossy(&output.stderr).trim());
        if output.status.success() {
            if !stderr.is_empty() {
                trace!(cmd = %display_args, stderr = %stderr, "git stderr");
            }
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(MirrorError::Git {
                args: display_args,
                stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn identity_rejects_bad_values() {
        assert!(Identity::new("", "a@b").is_err());
        assert!(Identity::new("bot", "").is_err());
        assert!(Identity::new("bot <evil>", "a@b").is_err());
        assert!(Identity::new("bot\n", "a@b").is_err());
        assert!(Identity::new("bot", "no-at-sign").is_err());
        assert!(matches!(
            Identity::new("", "a@b").unwrap_err(),
            MirrorError::Identity(_)
        ));
    }

    #[test]
    fn identity_accepts_handle_and_placeholder() {
        let identity = Identity::new("octocat", "mirror@users.noreply.localhost").unwrap();
        assert_eq!(identity.name(), "octocat");
        assert_eq!(identity.email(), "mirror@users.noreply.localhost");
    }

    #[test]
    fn identity_is_visible_to_git_without_writing_config() {
        let dir = TempDir::new().unwrap();
        let git = Git::new(dir.path());
        git.run(&["init", "--quiet"]).unwrap();

        let git = git.with_identity(Identity::new("octocat", "bot@example.com").unwrap());
        assert_eq!(git.run(&["config", "user.name"]).unwrap(), "octocat");

        let local = std::fs::read_to_string(dir.path().join(".git/config")).unwrap();
        assert!(!local.contains("octocat"));
    }

    #[test]
    fn failures_are_redacted() {
        let dir = TempDir::new().unwrap();
        let git = Git::new(dir.path()).with_secret("tok123secret".into());
        git.run(&["init", "--quiet"]).unwrap();

        let err = git
            .run(&["push", "file:///nonexistent/tok123secret.git", "HEAD"])
            .unwrap_err();
        let msg = err.to_string();
        assert!(!msg.contains("tok123secret"));
        assert!(msg.contains("[REDACTED]"));
    }
}
