use std::path::{Path, PathBuf};

use colored::Colorize;
use gix::Repository;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Credentials;
use crate::endpoint::RemoteEndpoint;
use crate::error::{MirrorError, Result, classify_push_failure};
use crate::git::{Git, Identity};
use crate::refs::{BRANCH_PREFIX, RefEntry, RefSnapshot, TAG_PREFIX};
use crate::secret::SecretString;

const BRANCH_REFSPEC: &str = "refs/heads/*:refs/heads/*";
const TAG_REFSPEC: &str = "refs/tags/*:refs/tags/*";

#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Remote to unshallow from when the checkout is shallow.
    pub source_remote: String,
    /// Also publish `refs/remotes/<name>/*` as branches.
    pub branches_from: Option<String>,
    pub atomic: bool,
    pub dry_run: bool,
    pub verify: bool,
    /// Fail on a shallow checkout instead of fetching the rest.
    pub require_full_history: bool,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            source_remote: "origin".to_string(),
            branches_from: None,
            atomic: false,
            dry_run: false,
            verify: false,
            require_full_history: false,
        }
    }
}

/// Everything one run needs. Built fresh per invocation and dropped after.
#[derive(Debug)]
pub struct MirrorJob {
    pub repo_path: PathBuf,
    pub endpoint: RemoteEndpoint,
    pub remote_name: String,
    pub identity: Identity,
    pub credentials: Credentials,
    pub options: MirrorOptions,
}

#[derive(Debug)]
pub struct MirrorReport {
    pub snapshot: RefSnapshot,
    pub dry_run: bool,
    pub verified: bool,
}

/// Force-publishes every branch and tag of the checkout to the destination.
#[instrument(skip_all, fields(repo = %job.repo_path.display(), destination = %job.endpoint))]
pub fn run(job: &MirrorJob) -> Result<MirrorReport> {
    let push_url = job.endpoint.authenticated_url(&job.credentials)?;
    let git =
        session(&job.repo_path, &job.credentials, &push_url).with_identity(job.identity.clone());

    let repo = ensure_full_history(&git, &job.options)?;
    register_remote(&repo, &git, &job.remote_name, &job.endpoint)?;

    let snapshot = RefSnapshot::local(&repo, job.options.branches_from.as_deref())?;
    info!(
        branches = snapshot.branches.len(),
        tags = snapshot.tags.len(),
        "collected refs to mirror"
    );

    let url = push_url.expose().as_str();
    let stale = Stale::between(&snapshot, &list_destination(&git, url)?);
    if !stale.is_empty() {
        info!(
            branches = stale.branches.len(),
            tags = stale.tags.len(),
            "destination has refs the source no longer has"
        );
    }

    if job.options.dry_run {
        println!("--- Refs that would be force-pushed (dry run) ---");
        print_snapshot(&snapshot);
        for name in stale.branches.iter().chain(&stale.tags) {
            println!("{} {}", "delete".red(), name);
        }
        let refspecs = all_refspecs(&snapshot, &stale);
        if !refspecs.is_empty() {
            push(&git, url, &refspecs, &["--dry-run"])?;
        }
        return Ok(MirrorReport {
            snapshot,
            dry_run: true,
            verified: false,
        });
    }

    if job.options.atomic {
        let refspecs = all_refspecs(&snapshot, &stale);
        if refspecs.is_empty() {
            warn!("nothing to mirror");
        } else {
            push(&git, url, &refspecs, &["--atomic"])?;
            info!("branches and tags pushed atomically");
        }
    } else {
        push_independently(&git, url, &snapshot, &stale)?;
    }

    let verified = if job.options.verify {
        verify_against(&git, url, &snapshot)?;
        true
    } else {
        false
    };

    Ok(MirrorReport {
        snapshot,
        dry_run: false,
        verified,
    })
}

/// Compares the destination's refs with the checkout's, without pushing.
#[instrument(skip_all, fields(destination = %endpoint))]
pub fn verify(
    repo_path: &Path,
    endpoint: &RemoteEndpoint,
    credentials: &Credentials,
    branches_from: Option<&str>,
) -> Result<RefSnapshot> {
    let push_url = endpoint.authenticated_url(credentials)?;
    let git = session(repo_path, credentials, &push_url);
    let repo = gix::open(repo_path)?;
    let snapshot = RefSnapshot::local(&repo, branches_from)?;
    verify_against(&git, push_url.expose(), &snapshot)?;
    Ok(snapshot)
}

/// Git runner that scrubs both halves of the credential pair and the push URL.
fn session(repo_path: &Path, credentials: &Credentials, push_url: &SecretString) -> Git {
    Git::new(repo_path)
        .with_secret(credentials.token.clone())
        .with_secret(credentials.handle.clone())
        .with_secret(push_url.clone())
}

/// Destination refs with no counterpart in the source; deleted by the push.
#[derive(Debug, Default, PartialEq, Eq)]
struct Stale {
    branches: Vec<String>,
    tags: Vec<String>,
}

impl Stale {
    fn between(source: &RefSnapshot, destination: &RefSnapshot) -> Self {
        Self {
            branches: destination
                .branches
                .keys()
                .filter(|name| !source.branches.contains_key(*name))
                .cloned()
                .collect(),
            tags: destination
                .tags
                .keys()
                .filter(|name| !source.tags.contains_key(*name))
                .cloned()
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.tags.is_empty()
    }
}

/// A shallow checkout would publish truncated history, or be refused.
fn ensure_full_history(git: &Git, options: &MirrorOptions) -> Result<Repository> {
    let repo = gix::open(git.repo())?;
    if !repo.is_shallow() {
        return Ok(repo);
    }

    if options.require_full_history {
        return Err(MirrorError::History(
            "checkout is shallow; fetch with full depth before mirroring".into(),
        ));
    }

    info!(remote = %options.source_remote, "checkout is shallow, fetching full history");
    git.run(&["fetch", "--unshallow", "--tags", &options.source_remote])
        .map_err(|e| MirrorError::History(e.to_string()))?;

    let repo = gix::open(git.repo())?;
    if repo.is_shallow() {
        return Err(MirrorError::History(
            "checkout is still shallow after unshallow fetch".into(),
        ));
    }
    Ok(repo)
}

fn register_remote(
    repo: &Repository,
    git: &Git,
    name: &str,
    endpoint: &RemoteEndpoint,
) -> Result<()> {
    let wanted = endpoint.public_url().as_str();

    if let Some(existing) = repo.try_find_remote(name) {
        existing.map_err(|e| MirrorError::Remote {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        // gix normalises URLs when parsing; ask git for the configured text.
        let existing_url = git
            .run(&["remote", "get-url", "--push", name])
            .map_err(|e| MirrorError::Remote {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        if same_url(&existing_url, wanted) {
            debug!(remote = %name, "destination remote already registered");
            return Ok(());
        }
        return Err(MirrorError::RemoteCollision {
            name: name.to_string(),
            existing: git.redact(&existing_url),
        });
    }

    git.run(&["remote", "add", name, wanted])
        .map_err(|e| MirrorError::Remote {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    info!(remote = %name, url = %wanted, "registered destination remote");
    Ok(())
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

fn branch_refspecs(snapshot: &RefSnapshot, stale: &Stale) -> Vec<String> {
    let mut specs = Vec::new();
    if !snapshot.branches.is_empty() {
        specs.push(BRANCH_REFSPEC.to_string());
        specs.extend(
            snapshot
                .tracking_branches()
                .map(|(name, entry)| format!("{}:{name}", entry.source)),
        );
    }
    specs.extend(stale.branches.iter().map(|name| format!(":{name}")));
    specs
}

fn tag_refspecs(snapshot: &RefSnapshot, stale: &Stale) -> Vec<String> {
    let mut specs = Vec::new();
    if !snapshot.tags.is_empty() {
        specs.push(TAG_REFSPEC.to_string());
    }
    specs.extend(stale.tags.iter().map(|name| format!(":{name}")));
    specs
}

fn all_refspecs(snapshot: &RefSnapshot, stale: &Stale) -> Vec<String> {
    let mut specs = branch_refspecs(snapshot, stale);
    specs.extend(tag_refspecs(snapshot, stale));
    specs
}

fn push(git: &Git, url: &str, refspecs: &[String], extra: &[&str]) -> Result<()> {
    let mut args = vec!["push", "--force"];
    args.extend_from_slice(extra);
    args.push(url);
    args.extend(refspecs.iter().map(String::as_str));

    let out = git.run(&args).map_err(|e| match e {
        MirrorError::Git { args, stderr } => classify_push_failure(&args, stderr),
        other => other,
    })?;
    debug!(output = %git.redact(&out), "push finished");
    Ok(())
}

/// Branches and tags go in separate pushes; a branch failure does not stop
/// the tag push.
fn push_independently(
    git: &Git,
    url: &str,
    snapshot: &RefSnapshot,
    stale: &Stale,
) -> Result<()> {
    let branches = match branch_refspecs(snapshot, stale) {
        specs if specs.is_empty() => {
            warn!("no branches to mirror");
            Ok(())
        }
        specs => push(git, url, &specs, &[]),
    };
    match &branches {
        Ok(()) => info!(count = snapshot.branches.len(), "branches force-pushed"),
        Err(e) => error!(error = %e, "branch push failed"),
    }

    let tags = match tag_refspecs(snapshot, stale) {
        specs if specs.is_empty() => {
            debug!("no tags to mirror");
            Ok(())
        }
        specs => push(git, url, &specs, &[]),
    };
    match &tags {
        Ok(()) => info!(count = snapshot.tags.len(), "tags force-pushed"),
        Err(e) => error!(error = %e, "tag push failed"),
    }

    match (branches, tags) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) => Err(MirrorError::Partial {
            pushed: "tags",
            failed: "branches",
            source: Box::new(e),
        }),
        (Ok(()), Err(e)) => Err(MirrorError::Partial {
            pushed: "branches",
            failed: "tags",
            source: Box::new(e),
        }),
        (Err(b), Err(t)) => Err(MirrorError::BothFailed {
            branches: Box::new(b),
            tags: Box::new(t),
        }),
    }
}

fn list_destination(git: &Git, url: &str) -> Result<RefSnapshot> {
    let listing = git
        .run(&["ls-remote", "--heads", "--tags", url])
        .map_err(|e| match e {
            MirrorError::Git { args, stderr } => classify_push_failure(&args, stderr),
            other => other,
        })?;
    RefSnapshot::parse_ls_remote(&listing)
}

fn verify_against(git: &Git, url: &str, snapshot: &RefSnapshot) -> Result<()> {
    let remote = list_destination(git, url)?;
    let differences = snapshot.differences(&remote);
    if differences.is_empty() {
        info!(refs = snapshot.len(), "destination matches source");
        Ok(())
    } else {
        Err(MirrorError::VerifyMismatch(differences))
    }
}

pub fn print_snapshot(snapshot: &RefSnapshot) {
    for (name, entry) in &snapshot.branches {
        print_ref_oneline("branch", name.trim_start_matches(BRANCH_PREFIX), entry);
    }
    for (name, entry) in &snapshot.tags {
        print_ref_oneline("tag", name.trim_start_matches(TAG_PREFIX), entry);
    }
}

fn print_ref_oneline(kind: &str, short: &str, entry: &RefEntry) {
    let id = entry.id.to_string();
    let from = if entry.source.starts_with(BRANCH_PREFIX) || entry.source.starts_with(TAG_PREFIX)
    {
        String::new()
    } else {
        format!(" (from {})", entry.source)
    };
    println!(
        "{} {:>6} {}{}",
        &id[0..7].dimmed(),
        kind.blue(),
        short.green(),
        from.dimmed(),
    );
}
