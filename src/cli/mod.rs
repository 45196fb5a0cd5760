use clap::{Parser, Subcommand};

pub mod config;
pub mod logging;
pub mod logout;
pub mod run;
pub mod status;
pub mod version;

#[derive(Parser)]
#[command(name = "session-relay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Session lifecycle manager and inbox relay", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect, pair or resume, and relay inbound messages until the connection closes
    Run {
        /// Path to config file (default: ~/.local/share/session-relay/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Show whether a stored session exists and can be resumed
    Status {
        /// Path to config file
        #[arg(long)]
        config: Option<String>,
    },

    /// Remove the stored session so the next run pairs again
    Logout {
        /// Path to config file
        #[arg(long)]
        config: Option<String>,

        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run { config } => run::execute(config).await,
        Commands::Status { config } => status::execute(config).await,
        Commands::Logout { config, yes } => logout::execute(config, yes).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
