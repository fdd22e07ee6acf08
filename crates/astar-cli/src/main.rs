mod cmd;
mod output;
mod paths;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "astar",
    about = "Astar authentication: run the auth server, manage a login session, inspect roles",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = "ASTAR_CONFIG", default_value = astar_core::config::CONFIG_FILE)]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Directory holding the stored session (default: ~/.astar)
    #[arg(long, global = true, env = "ASTAR_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the authentication server
    Serve {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Log in to a server and store the session
    Login {
        /// Server base URL
        #[arg(long, env = "ASTAR_SERVER", default_value = "http://localhost:8080")]
        server: String,

        #[arg(long, short)]
        username: String,

        #[arg(long, env = "ASTAR_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Refresh the stored session now
    Refresh,

    /// Revoke the stored session on the server and forget it locally
    Logout,

    /// Show the logged-in user as the server sees it
    Whoami,

    /// Print a valid access token, refreshing first if it is about to expire
    Token,

    /// Check whether the given roles grant a permission (evaluated locally)
    Can {
        /// Permission in resource:action[,action][:scope] form
        permission: String,

        /// Role to evaluate (repeatable)
        #[arg(long = "role", required = true)]
        roles: Vec<String>,

        /// Treat the target record as owned by the caller
        #[arg(long)]
        owned: bool,
    },

    /// List roles with their parents and effective permissions
    Roles,

    /// Validate the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Generate an Argon2id password hash for a user entry
    HashPassword { password: String },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let session_dir = paths::resolve_session_dir(cli.session_dir.as_deref());

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&cli.config, port),
        Commands::Login {
            server,
            username,
            password,
        } => cmd::session::login(&session_dir, &server, &username, password, cli.json),
        Commands::Refresh => cmd::session::refresh(&cli.config, &session_dir, cli.json),
        Commands::Logout => cmd::session::logout(&session_dir),
        Commands::Whoami => cmd::session::whoami(&cli.config, &session_dir, cli.json),
        Commands::Token => cmd::session::token(&cli.config, &session_dir, cli.json),
        Commands::Can {
            permission,
            roles,
            owned,
        } => cmd::can::run(&cli.config, &permission, &roles, owned, cli.json),
        Commands::Roles => cmd::roles::run(&cli.config, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&cli.config, subcommand, cli.json),
        Commands::HashPassword { password } => cmd::password::run(&password, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
