use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::Colorize;
use sithub_protocol::{RemoteLocation, PROTOCOL_VERSION};
use sithub_repo::{RepoConfig, Repository};
use sithub_server::{Server, ServerConfig};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Init(args) => cmd_init(args),
        Command::Clone(args) => runtime()?.block_on(cmd_clone(args)),
        Command::Serve(args) => runtime()?.block_on(cmd_serve(args)),
        Command::Version => {
            println!(
                "sithub {} (protocol v{PROTOCOL_VERSION})",
                env!("CARGO_PKG_VERSION")
            );
            Ok(())
        }
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}

fn cmd_init(args: InitArgs) -> anyhow::Result<()> {
    let path = args.path.unwrap_or_else(|| PathBuf::from("."));
    let repo = Repository::initialize(&path)?;
    println!(
        "{} Initialized empty repository in {}",
        "✓".green().bold(),
        repo.meta_dir().display().to_string().bold()
    );
    println!("  Branch: {}", repo.config().default_branch.yellow());
    Ok(())
}

async fn cmd_clone(args: CloneArgs) -> anyhow::Result<()> {
    let dest = match args.dest {
        Some(dest) => dest,
        None => default_destination(&args.location)?,
    };
    let mut options = RepoConfig::default().transfer;
    if let Some(secs) = args.connect_timeout {
        options.connect_timeout_secs = secs;
    }
    if let Some(secs) = args.io_timeout {
        options.io_timeout_secs = secs;
    }

    println!("Cloning into {}...", dest.display().to_string().bold());
    let repo = Repository::clone_with_options(&args.location, &dest, options.clone_options())
        .await
        .with_context(|| format!("clone of {} failed", args.location))?;

    let refs = repo.list_refs()?;
    match repo.head_commit()? {
        Some(head) => println!(
            "{} Cloned {} refs; HEAD at {}",
            "✓".green().bold(),
            refs.len(),
            head.short_hex().yellow()
        ),
        None => println!("{} Cloned an empty repository", "✓".green().bold()),
    }
    Ok(())
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind
            .parse()
            .with_context(|| format!("invalid bind address {bind:?}"))?;
    }
    if let Some(repo) = args.repo {
        config.repo_path = repo;
    }

    let bind = config.bind_addr;
    let root = config.repo_path.clone();
    let server = Server::new(config)?;
    println!(
        "SitHub server on {} (repository: {})",
        bind.to_string().bold(),
        root.display()
    );
    server
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    println!("{} Server stopped", "✓".green());
    Ok(())
}

/// Last path component of a local source, or the host of a remote one.
fn default_destination(location: &str) -> anyhow::Result<PathBuf> {
    let name = match RemoteLocation::parse(location)? {
        RemoteLocation::Local(path) => path_name(&path)?,
        RemoteLocation::Tcp { host, .. } => host,
    };
    Ok(PathBuf::from(name))
}

fn path_name(path: &Path) -> anyhow::Result<String> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("cannot derive a destination from {}", path.display()))
}
