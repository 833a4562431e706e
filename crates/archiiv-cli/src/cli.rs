use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "archiiv", about = "Archiiv: reference-counted archival file store", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new data directory
    Init(InitArgs),
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Manage users
    User(UserArgs),
    /// Generate a token signing secret
    Secret,
    /// Print the record tree
    Ls(LsArgs),
    /// Check the storage directory without changing it
    Fsck(StoreArgs),
}

/// Where the store lives. Flags override the config file.
#[derive(Args, Clone, Debug, Default)]
pub struct StoreArgs {
    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub fs_root: Option<PathBuf>,
    #[arg(long)]
    pub users: Option<PathBuf>,
    /// Root record id
    #[arg(long)]
    pub root: Option<String>,
}

#[derive(Args)]
pub struct InitArgs {
    pub dir: PathBuf,
    /// Create this user right away
    #[arg(long, requires = "password")]
    pub user: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Allow cross-origin requests from anywhere
    #[arg(long)]
    pub cors: bool,
}

#[derive(Args)]
pub struct UserArgs {
    #[command(subcommand)]
    pub action: UserAction,
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Subcommand)]
pub enum UserAction {
    Add {
        name: String,
        #[arg(short, long)]
        password: String,
    },
    Remove {
        name: String,
    },
    List,
}

#[derive(Args)]
pub struct LsArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Start here instead of the root
    pub id: Option<String>,
    #[arg(short, long, default_value = "8")]
    pub depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["archiiv", "init", "/srv/archiiv"]).unwrap();
        if let Command::Init(args) = cli.command {
            assert_eq!(args.dir, PathBuf::from("/srv/archiiv"));
            assert!(args.user.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn init_user_needs_password() {
        assert!(Cli::try_parse_from(["archiiv", "init", "d", "--user", "marek"]).is_err());
        assert!(Cli::try_parse_from([
            "archiiv", "init", "d", "--user", "marek", "--password", "123"
        ])
        .is_ok());
    }

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from([
            "archiiv",
            "serve",
            "--config",
            "archiiv.toml",
            "--bind",
            "0.0.0.0:8080",
            "--cors",
        ])
        .unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind, Some("0.0.0.0:8080".parse().unwrap()));
            assert_eq!(args.store.config, Some(PathBuf::from("archiiv.toml")));
            assert!(args.cors);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_user_add() {
        let cli = Cli::try_parse_from([
            "archiiv", "user", "--users", "u.json", "add", "marek", "-p", "123",
        ])
        .unwrap();
        if let Command::User(args) = cli.command {
            assert_eq!(args.store.users, Some(PathBuf::from("u.json")));
            assert!(matches!(args.action, UserAction::Add { ref name, .. } if name == "marek"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_ls_depth() {
        let cli = Cli::try_parse_from(["archiiv", "ls", "-d", "2"]).unwrap();
        if let Command::Ls(args) = cli.command {
            assert_eq!(args.depth, 2);
            assert!(args.id.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_fsck_and_secret() {
        let cli = Cli::try_parse_from(["archiiv", "fsck", "--fs-root", "fs", "--root", "x"]).unwrap();
        assert!(matches!(cli.command, Command::Fsck(_)));
        let cli = Cli::try_parse_from(["archiiv", "secret"]).unwrap();
        assert!(matches!(cli.command, Command::Secret));
    }

    #[test]
    fn parse_verbose_and_format() {
        let cli = Cli::try_parse_from(["archiiv", "--verbose", "--format", "json", "secret"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
