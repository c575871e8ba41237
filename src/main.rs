use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mirrorpush::config::{ConfigOverrides, Credentials, FileConfig, MirrorConfig};
use mirrorpush::git::Identity;
use mirrorpush::mirror::{self, MirrorJob, MirrorOptions};
use mirrorpush::refs::RefSnapshot;
use mirrorpush::trigger::{self, Activation, TriggerEvent};
use mirrorpush::{MirrorError, Result};

/// Force-mirror every branch and tag of a repository to one destination.
///
/// Run from a checkout with full history. Shallow checkouts are unshallowed
/// from the source remote first, unless --require-full-history is given.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror the checkout if the triggering event is a push to the primary branch
    Run(RunArgs),
    /// Compare destination refs with the checkout without pushing
    Verify(VerifyArgs),
    /// Print the refs a run would publish
    Refs(RefsArgs),
}

#[derive(Args, Debug)]
struct DestinationArgs {
    /// Checkout to mirror from
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// TOML config file
    #[arg(long, env = "MIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Destination URL scheme (https, http or file)
    #[arg(long, env = "MIRROR_SCHEME")]
    scheme: Option<String>,

    /// Destination host
    #[arg(long, env = "MIRROR_HOST")]
    host: Option<String>,

    /// Repository path on the destination host
    #[arg(long, env = "MIRROR_PATH")]
    path: Option<String>,

    /// Name the destination is registered under in the checkout
    #[arg(long, env = "MIRROR_REMOTE_NAME")]
    remote_name: Option<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    destination: DestinationArgs,

    /// Branch whose pushes trigger a mirror
    #[arg(long, env = "MIRROR_PRIMARY_BRANCH")]
    primary_branch: Option<String>,

    /// Kind of the triggering event
    #[arg(long, env = "GITHUB_EVENT_NAME", default_value = "push")]
    event: String,

    /// Ref the triggering push updated
    #[arg(long = "ref", env = "GITHUB_REF")]
    git_ref: Option<String>,

    /// JSON event payload, consulted when no ref is given
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: Option<PathBuf>,

    /// Mirror regardless of the triggering event
    #[arg(long)]
    force_trigger: bool,

    /// Remote to fetch missing history from
    #[arg(long, default_value = "origin")]
    source_remote: String,

    /// Also publish this remote's tracking branches as branches
    #[arg(long)]
    branches_from: Option<String>,

    /// Send branches and tags in one all-or-nothing push
    #[arg(long)]
    atomic: bool,

    /// Show what would be pushed without touching the destination
    #[arg(long)]
    dry_run: bool,

    /// Compare destination refs with the checkout after pushing
    #[arg(long)]
    verify: bool,

    /// Fail on a shallow checkout instead of fetching the rest
    #[arg(long)]
    require_full_history: bool,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    #[command(flatten)]
    destination: DestinationArgs,

    /// Also compare this remote's tracking branches
    #[arg(long)]
    branches_from: Option<String>,
}

#[derive(Args, Debug)]
struct RefsArgs {
    /// Checkout to inspect
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Also list this remote's tracking branches
    #[arg(long)]
    branches_from: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Verify(args) => verify(args),
        Command::Refs(args) => refs(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "mirror failed");
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &DestinationArgs, primary_branch: Option<String>) -> Result<MirrorConfig> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    MirrorConfig::resolve(
        file,
        ConfigOverrides {
            scheme: args.scheme.clone(),
            host: args.host.clone(),
            path: args.path.clone(),
            remote_name: args.remote_name.clone(),
            primary_branch,
        },
    )
}

fn trigger_event(args: &RunArgs) -> Result<TriggerEvent> {
    let git_ref = match (&args.git_ref, &args.event_path) {
        (Some(r), _) => Some(r.clone()),
        (None, Some(path)) => trigger::ref_from_payload(path)?,
        (None, None) => None,
    };
    Ok(TriggerEvent::new(&args.event, git_ref))
}

fn run(args: RunArgs) -> Result<()> {
    let config = load_config(&args.destination, args.primary_branch.clone())?;

    if args.force_trigger {
        info!("trigger check bypassed");
    } else if let Activation::Skip(reason) = trigger_event(&args)?.evaluate(&config.primary_branch)
    {
        info!(%reason, "not mirroring");
        println!("{} {reason}", "skipped:".yellow());
        return Ok(());
    }

    let credentials = Credentials::from_env(&config.handle_var, &config.token_var)?;
    let identity_name = config
        .identity_name
        .clone()
        .unwrap_or_else(|| credentials.handle.expose().clone());
    let identity = Identity::new(identity_name, config.identity_email.clone())?;

    let job = MirrorJob {
        repo_path: args.destination.repo,
        endpoint: config.endpoint,
        remote_name: config.remote_name,
        identity,
        credentials,
        options: MirrorOptions {
            source_remote: args.source_remote,
            branches_from: args.branches_from,
            atomic: args.atomic,
            dry_run: args.dry_run,
            verify: args.verify,
            require_full_history: args.require_full_history,
        },
    };

    let report = mirror::run(&job)?;
    if report.dry_run {
        println!("{} {} refs would be mirrored", "dry run:".yellow(), report.snapshot.len());
    } else {
        println!(
            "{} {} branches and {} tags mirrored to {}{}",
            "done:".green().bold(),
            report.snapshot.branches.len(),
            report.snapshot.tags.len(),
            job.endpoint,
            if report.verified { " (verified)" } else { "" },
        );
    }
    Ok(())
}

fn verify(args: VerifyArgs) -> Result<()> {
    let config = load_config(&args.destination, None)?;
    let credentials = Credentials::from_env(&config.handle_var, &config.token_var)?;
    let snapshot = mirror::verify(
        &args.destination.repo,
        &config.endpoint,
        &credentials,
        args.branches_from.as_deref(),
    )?;
    println!(
        "{} {} refs match {}",
        "ok:".green().bold(),
        snapshot.len(),
        config.endpoint
    );
    Ok(())
}

fn refs(args: RefsArgs) -> Result<()> {
    let repo = open(&args.repo)?;
    let snapshot = RefSnapshot::local(&repo, args.branches_from.as_deref())?;
    mirror::print_snapshot(&snapshot);
    Ok(())
}

fn open(path: &Path) -> Result<gix::Repository> {
    gix::open(path).map_err(MirrorError::from)
}
