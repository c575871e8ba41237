#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use mirrorpush::refs::RefSnapshot;
use tempfile::TempDir;

/// Runs git in `dir` with a throwaway identity and signing disabled.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@test.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("failed to start git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

pub struct Fixture {
    pub dir: TempDir,
    pub source: PathBuf,
    pub dest: PathBuf,
}

impl Fixture {
    /// Source repo with `main`, `feature`, a lightweight tag `v1` and an
    /// annotated tag `v2`, plus an empty bare destination.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        let dest = dir.path().join("dest.git");
        fs::create_dir_all(&source).unwrap();

        git(&source, &["init", "-q"]);
        git(&source, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&source, &["commit", "-q", "--allow-empty", "-m", "one"]);
        git(&source, &["commit", "-q", "--allow-empty", "-m", "two"]);
        git(&source, &["checkout", "-q", "-b", "feature"]);
        git(&source, &["commit", "-q", "--allow-empty", "-m", "feature work"]);
        git(&source, &["checkout", "-q", "main"]);
        git(&source, &["tag", "v1"]);
        git(&source, &["tag", "-a", "v2", "-m", "release two"]);

        git(dir.path(), &["init", "-q", "--bare", "dest.git"]);

        Self { dir, source, dest }
    }

    pub fn dest_str(&self) -> &str {
        self.dest.to_str().unwrap()
    }

    pub fn source_url(&self) -> String {
        format!("file://{}", self.source.display())
    }

    pub fn rev(&self, repo: &Path, rev: &str) -> String {
        git(repo, &["rev-parse", rev])
    }

    pub fn dest_refs(&self) -> RefSnapshot {
        RefSnapshot::parse_ls_remote(&git(&self.dest, &["ls-remote", "."])).unwrap()
    }

    pub fn local_refs(&self, repo: &Path, branches_from: Option<&str>) -> RefSnapshot {
        let repo = gix::open(repo).unwrap();
        RefSnapshot::local(&repo, branches_from).unwrap()
    }
}
