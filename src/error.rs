use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("history is incomplete: {0}")]
    History(String),

    #[error("invalid committer identity: {0}")]
    Identity(String),

    #[error("remote '{name}' already exists and points at {existing}")]
    RemoteCollision { name: String, existing: String },

    #[error("failed to register remote '{name}': {reason}")]
    Remote { name: String, reason: String },

    #[error("authentication against the destination failed: {0}")]
    Auth(String),

    #[error("destination rejected the force-push: {0}")]
    PushRejected(String),

    #[error("missing credential: set {var} or {var}_FILE")]
    MissingCredential { var: String },

    #[error("invalid credential in {var}: {reason}")]
    InvalidCredential { var: String, reason: String },

    #[error("failed to read secret file at {path}: {source}")]
    SecretFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("failed to open repository: {0}")]
    Open(#[from] Box<gix::open::Error>),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("`git {args}` failed: {stderr}")]
    Git { args: String, stderr: String },

    #[error("git not found in PATH")]
    GitNotInstalled,

    #[error("destination refs differ from source: {}", .0.join(", "))]
    VerifyMismatch(Vec<String>),

    #[error("mirror incomplete ({pushed} pushed); {failed} push failed: {source}")]
    Partial {
        pushed: &'static str,
        failed: &'static str,
        #[source]
        source: Box<MirrorError>,
    },

    #[error("branches and tags push both failed: {branches}; {tags}")]
    BothFailed {
        branches: Box<MirrorError>,
        tags: Box<MirrorError>,
    },

    #[error("failed to read event payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<gix::open::Error> for MirrorError {
    fn from(err: gix::open::Error) -> Self {
        Self::Open(Box::new(err))
    }
}

const AUTH_MARKERS: &[&str] = &[
    "authentication failed",
    "could not read username",
    "could not read password",
    "invalid username or password",
    "http basic: access denied",
    "the requested url returned error: 401",
    "the requested url returned error: 403",
    "permission denied",
    "access denied",
];

const REJECT_MARKERS: &[&str] = &[
    "[rejected]",
    "[remote rejected]",
    "protected branch",
    "pre-receive hook declined",
    "failed to push some refs",
    "denying non-fast-forward",
    "atomic push failed",
];

/// Maps the stderr of a failed push or ls-remote onto the error taxonomy.
///
/// `stderr` must already be redacted.
pub fn classify_push_failure(args: &str, stderr: String) -> MirrorError {
    let lower = stderr.to_lowercase();
    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        MirrorError::Auth(stderr)
    } else if REJECT_MARKERS.iter().any(|m| lower.contains(m)) {
        MirrorError::PushRejected(stderr)
    } else {
        MirrorError::Git {
            args: args.to_string(),
            stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_failures() {
        let err = classify_push_failure(
            "push",
            "remote: HTTP Basic: Access denied\nfatal: Authentication failed for 'https://host/x'".into(),
        );
        assert!(matches!(err, MirrorError::Auth(_)));

        let err = classify_push_failure(
            "push",
            "fatal: could not read Username for 'https://host': terminal prompts disabled".into(),
        );
        assert!(matches!(err, MirrorError::Auth(_)));
    }

    #[test]
    fn classifies_rejections() {
        let err = classify_push_failure(
            "push",
            " ! [remote rejected] main -> main (protected branch hook declined)\nerror: failed to push some refs".into(),
        );
        assert!(matches!(err, MirrorError::PushRejected(_)));
    }

    #[test]
    fn falls_back_to_generic_git_error() {
        let err = classify_push_failure("push", "fatal: unable to access: Could not resolve host".into());
        match err {
            MirrorError::Git { args, stderr } => {
                assert_eq!(args, "push");
                assert!(stderr.contains("Could not resolve host"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn partial_error_names_both_halves() {
        let err = MirrorError::Partial {
            pushed: "branches",
            failed: "tags",
            source: Box::new(MirrorError::PushRejected("tag exists".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("branches pushed"));
        assert!(msg.contains("tags push failed"));
    }
}
