use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sithub",
    about = "SitHub: self-hosted source repositories",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log transfer and storage events to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty repository
    Init(InitArgs),
    /// Copy a repository with its full history
    Clone(CloneArgs),
    /// Host a repository for clones over TCP
    Serve(ServeArgs),
    /// Print version information
    Version,
}

#[derive(Args)]
pub struct InitArgs {
    pub path: Option<PathBuf>,
}

#[derive(Args)]
pub struct CloneArgs {
    /// Path, file://path, or sithub://host[:port]
    pub location: String,
    /// Defaults to the last component of the location
    pub dest: Option<PathBuf>,
    #[arg(long)]
    pub connect_timeout: Option<u64>,
    #[arg(long)]
    pub io_timeout: Option<u64>,
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<String>,
    #[arg(long)]
    pub repo: Option<PathBuf>,
    /// TOML server configuration; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["sithub", "init"]).unwrap();
        if let Command::Init(args) = cli.command {
            assert!(args.path.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_clone() {
        let cli = Cli::try_parse_from(["sithub", "clone", "sithub://h:1", "out", "--io-timeout", "5"]).unwrap();
        if let Command::Clone(args) = cli.command {
            assert_eq!(args.location, "sithub://h:1");
            assert_eq!(args.dest, Some(PathBuf::from("out")));
            assert_eq!(args.io_timeout, Some(5));
            assert_eq!(args.connect_timeout, None);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn clone_requires_location() {
        assert!(Cli::try_parse_from(["sithub", "clone"]).is_err());
    }

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["sithub", "serve", "--bind", "0.0.0.0:8080", "--repo", "/srv/r"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind.as_deref(), Some("0.0.0.0:8080"));
            assert_eq!(args.repo, Some(PathBuf::from("/srv/r")));
            assert!(args.config.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["sithub", "--verbose", "version"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Version));
    }
}
