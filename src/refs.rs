use std::collections::BTreeMap;

use gix::{ObjectId, Repository};

use crate::error::{MirrorError, Result};

pub const BRANCH_PREFIX: &str = "refs/heads/";
pub const TAG_PREFIX: &str = "refs/tags/";

/// One ref as it will appear on the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    /// Full name of the ref on the source side.
    pub source: String,
    pub id: ObjectId,
}

/// Branches and tags keyed by their full destination ref name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefSnapshot {
    pub branches: BTreeMap<String, RefEntry>,
    pub tags: BTreeMap<String, RefEntry>,
}

fn repo_err(e: impl std::fmt::Display) -> MirrorError {
    MirrorError::Repository(e.to_string())
}

impl RefSnapshot {
    /// Collects the refs a mirror run would publish.
    ///
    /// With `branches_from`, remote-tracking branches of that remote are
    /// mapped onto `refs/heads/` too; a local branch of the same name wins.
    pub fn local(repo: &Repository, branches_from: Option<&str>) -> Result<Self> {
        let mut snapshot = Self::default();
        let platform = repo.references().map_err(repo_err)?;

        for reference in platform.local_branches().map_err(repo_err)? {
            let reference = reference.map_err(repo_err)?;
            let Some(id) = reference.target().try_id().map(|id| id.to_owned()) else {
                continue;
            };
            let name = reference.name().as_bstr().to_string();
            snapshot.branches.insert(name.clone(), RefEntry { source: name, id });
        }

        if let Some(remote) = branches_from {
            let prefix = format!("refs/remotes/{remote}/");
            for reference in platform.remote_branches().map_err(repo_err)? {
                let reference = reference.map_err(repo_err)?;
                let Some(id) = reference.target().try_id().map(|id| id.to_owned()) else {
                    continue;
                };
                let source = reference.name().as_bstr().to_string();
                let Some(short) = source.strip_prefix(&prefix) else {
                    continue;
                };
                if short == "HEAD" {
                    continue;
                }
                let name = format!("{BRANCH_PREFIX}{short}");
                snapshot
                    .branches
                    .entry(name)
                    .or_insert(RefEntry { source, id });
            }
        }

        for reference in platform.tags().map_err(repo_err)? {
            let reference = reference.map_err(repo_err)?;
            let Some(id) = reference.target().try_id().map(|id| id.to_owned()) else {
                continue;
            };
            let name = reference.name().as_bstr().to_string();
            snapshot.tags.insert(name.clone(), RefEntry { source: name, id });
        }

        Ok(snapshot)
    }

    /// Parses `git ls-remote` output.
    ///
    /// Peeled tag lines (`^{}`) and refs outside `refs/heads/` and
    /// `refs/tags/` are ignored.
    pub fn parse_ls_remote(output: &str) -> Result<Self> {
        let mut snapshot = Self::default();

        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            let (hex, name) = line
                .split_once('\t')
                .ok_or_else(|| repo_err(format!("malformed ls-remote line: {line}")))?;
            let name = name.trim();
            if name.ends_with("^{}") {
                continue;
            }
            let id = ObjectId::from_hex(hex.trim().as_bytes()).map_err(repo_err)?;
            let entry = RefEntry {
                source: name.to_string(),
                id,
            };
            if name.starts_with(BRANCH_PREFIX) {
                snapshot.branches.insert(name.to_string(), entry);
            } else if name.starts_with(TAG_PREFIX) {
                snapshot.tags.insert(name.to_string(), entry);
            }
        }

        Ok(snapshot)
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.branches.len() + self.tags.len()
    }

    /// Branches whose source is a remote-tracking ref rather than a local
    /// branch; these need explicit refspecs.
    pub fn tracking_branches(&self) -> impl Iterator<Item = (&String, &RefEntry)> {
        self.branches
            .iter()
            .filter(|(name, entry)| entry.source != **name)
    }

    /// Names of refs that are missing, extra or point elsewhere in `other`.
    pub fn differences(&self, other: &RefSnapshot) -> Vec<String> {
        let mut out = Vec::new();
        diff_maps(&self.branches, &other.branches, &mut out);
        diff_maps(&self.tags, &other.tags, &mut out);
        out
    }
}

fn diff_maps(
    ours: &BTreeMap<String, RefEntry>,
    theirs: &BTreeMap<String, RefEntry>,
    out: &mut Vec<String>,
) {
    for (name, entry) in ours {
        match theirs.get(name) {
            Some(other) if other.id == entry.id => {}
            Some(_) => out.push(format!("{name} (differs)")),
            None => out.push(format!("{name} (missing)")),
        }
    }
    for name in theirs.keys().filter(|n| !ours.contains_key(*n)) {
        out.push(format!("{name} (extra)"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "1111111111111111111111111111111111111111";
    const B: &str = "2222222222222222222222222222222222222222";
    const C: &str = "3333333333333333333333333333333333333333";

    fn oid(hex: &str) -> ObjectId {
        ObjectId::from_hex(hex.as_bytes()).unwrap()
    }

    #[test]
    fn parses_ls_remote_output() {
        let output = format!(
            "{A}\tHEAD\n{A}\trefs/heads/main\n{B}\trefs/heads/dev\n{C}\trefs/tags/v1\n{A}\trefs/tags/v1^{{}}\n{B}\trefs/pull/1/head\n"
        );
        let snapshot = RefSnapshot::parse_ls_remote(&output).unwrap();

        assert_eq!(snapshot.branches.len(), 2);
        assert_eq!(snapshot.branches["refs/heads/main"].id, oid(A));
        assert_eq!(snapshot.branches["refs/heads/dev"].id, oid(B));
        assert_eq!(snapshot.tags.len(), 1);
        assert_eq!(snapshot.tags["refs/tags/v1"].id, oid(C));
    }

    #[test]
    fn empty_output_is_empty_snapshot() {
        let snapshot = RefSnapshot::parse_ls_remote("").unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
    }

    #[test]
    fn malformed_line_fails() {
        assert!(RefSnapshot::parse_ls_remote("not a ref line").is_err());
        assert!(RefSnapshot::parse_ls_remote("zzzz\trefs/heads/main").is_err());
    }

    #[test]
    fn differences_report_missing_extra_and_moved() {
        let ours = RefSnapshot::parse_ls_remote(&format!(
            "{A}\trefs/heads/main\n{B}\trefs/heads/dev\n{C}\trefs/tags/v1\n"
        ))
        .unwrap();
        let theirs = RefSnapshot::parse_ls_remote(&format!(
            "{A}\trefs/heads/main\n{C}\trefs/heads/dev\n{C}\trefs/tags/old\n"
        ))
        .unwrap();

        let diff = ours.differences(&theirs);
        assert_eq!(
            diff,
            vec![
                "refs/heads/dev (differs)".to_string(),
                "refs/tags/v1 (missing)".to_string(),
                "refs/tags/old (extra)".to_string(),
            ]
        );
        assert!(ours.differences(&ours).is_empty());
    }

    #[test]
    fn tracking_branches_are_those_with_foreign_source() {
        let mut snapshot = RefSnapshot::default();
        snapshot.branches.insert(
            "refs/heads/main".into(),
            RefEntry {
                source: "refs/heads/main".into(),
                id: oid(A),
            },
        );
        snapshot.branches.insert(
            "refs/heads/dev".into(),
            RefEntry {
                source: "refs/remotes/origin/dev".into(),
                id: oid(B),
            },
        );
        let tracking: Vec<_> = snapshot.tracking_branches().map(|(n, _)| n.as_str()).collect();
        assert_eq!(tracking, vec!["refs/heads/dev"]);
    }
}
