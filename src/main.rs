use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use sandpool::config::Config;
use sandpool::mounts::MountManager;
use sandpool::server::rest::{run_rest_server, server::docker_provisioner};
use sandpool::shared::logging::init_logging;

#[derive(Parser)]
#[command(name = "sandpool")]
#[command(about = "Sandpool - Pre-warmed sandbox pool for compile, execute and test requests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API server (default command)
    Serve {
        /// Host for API server
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port for API server
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Remove leftover managed containers and their mounts
    Prune,

    /// Print the configuration the server would start with
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    let _log_guards = init_logging(&config.server.log_dir, "sandpool")?;

    match cli.command.unwrap_or(Commands::Serve { host: None, port: None }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_rest_server(config).await?;
        }
        Commands::Prune => {
            let mounts = Arc::new(MountManager::new(&config.mounts_path));
            let provisioner = docker_provisioner(&config, mounts).await?;
            let removed = provisioner.prune().await?;
            println!("Removed {} managed container(s)", removed);
        }
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
