use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Push,
    Other(String),
}

impl EventKind {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "push" => Self::Push,
            other => Self::Other(other.to_string()),
        }
    }
}

/// What the hosting runner reported about the activity that started us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub kind: EventKind,
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Run,
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotAPush(String),
    NoRef,
    OtherRef { got: String, expected: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAPush(kind) => write!(f, "event '{kind}' is not a push"),
            SkipReason::NoRef => write!(f, "push event carries no ref"),
            SkipReason::OtherRef { got, expected } => {
                write!(f, "push to '{got}', only '{expected}' is mirrored")
            }
        }
    }
}

impl TriggerEvent {
    pub fn new(kind: &str, git_ref: Option<String>) -> Self {
        Self {
            kind: EventKind::parse(kind),
            git_ref: git_ref.filter(|r| !r.is_empty()),
        }
    }

    pub fn evaluate(&self, primary_branch: &str) -> Activation {
        if let EventKind::Other(kind) = &self.kind {
            return Activation::Skip(SkipReason::NotAPush(kind.clone()));
        }

        let expected = format!("refs/heads/{primary_branch}");
        match self.git_ref.as_deref() {
            None => Activation::Skip(SkipReason::NoRef),
            Some(r) if r == expected || r == primary_branch => Activation::Run,
            Some(r) => Activation::Skip(SkipReason::OtherRef {
                got: r.to_string(),
                expected,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    reference: Option<String>,
}

/// Reads the pushed ref out of a webhook-style JSON payload file.
pub fn ref_from_payload(path: &Path) -> Result<Option<String>> {
    let content = fs::read_to_string(path)?;
    let payload: PushPayload = serde_json::from_str(&content)?;
    Ok(payload.reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn push_to_primary_runs() {
        let event = TriggerEvent::new("push", Some("refs/heads/main".into()));
        assert_eq!(event.evaluate("main"), Activation::Run);
    }

    #[test]
    fn bare_branch_name_is_accepted() {
        let event = TriggerEvent::new("push", Some("main".into()));
        assert_eq!(event.evaluate("main"), Activation::Run);
    }

    #[test]
    fn push_to_other_branch_skips() {
        let event = TriggerEvent::new("push", Some("refs/heads/feature/x".into()));
        assert_eq!(
            event.evaluate("main"),
            Activation::Skip(SkipReason::OtherRef {
                got: "refs/heads/feature/x".into(),
                expected: "refs/heads/main".into(),
            })
        );
    }

    #[test]
    fn tag_push_named_like_primary_skips() {
        let event = TriggerEvent::new("push", Some("refs/tags/main".into()));
        assert!(matches!(event.evaluate("main"), Activation::Skip(_)));
    }

    #[test]
    fn non_push_events_skip() {
        for kind in ["workflow_dispatch", "pull_request", "schedule"] {
            let event = TriggerEvent::new(kind, Some("refs/heads/main".into()));
            assert_eq!(
                event.evaluate("main"),
                Activation::Skip(SkipReason::NotAPush(kind.into()))
            );
        }
    }

    #[test]
    fn empty_ref_counts_as_missing() {
        let event = TriggerEvent::new("push", Some(String::new()));
        assert_eq!(event.evaluate("main"), Activation::Skip(SkipReason::NoRef));
    }

    #[test]
    fn reads_ref_from_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("event.json");
        fs::write(
            &path,
            r#"{"ref":"refs/heads/main","before":"0000","after":"1111","forced":false}"#,
        )
        .unwrap();
        assert_eq!(
            ref_from_payload(&path).unwrap().as_deref(),
            Some("refs/heads/main")
        );
    }

    #[test]
    fn payload_without_ref_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("event.json");
        fs::write(&path, r#"{"inputs":{}}"#).unwrap();
        assert_eq!(ref_from_payload(&path).unwrap(), None);
    }

    proptest! {
        #[test]
        fn only_the_primary_branch_activates(
            primary in "[a-z][a-z0-9_-]{0,15}",
            other in "[a-z][a-z0-9_-]{0,15}",
        ) {
            prop_assume!(primary != other);
            let event = TriggerEvent::new("push", Some(format!("refs/heads/{other}")));
            prop_assert!(matches!(event.evaluate(&primary), Activation::Skip(_)));

            let event = TriggerEvent::new("push", Some(format!("refs/heads/{primary}")));
            prop_assert_eq!(event.evaluate(&primary), Activation::Run);
        }
    }
}
