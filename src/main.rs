use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use command_gateway::config::{load_config, GatewayConfig};
use command_gateway::lifecycle::{shutdown_signal, Shutdown};
use command_gateway::observability::{logging, metrics};
use command_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "command-gateway")]
#[command(about = "Serve a command-line program over HTTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Start {
        /// Path to the TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the listener port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate a configuration file and exit
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => {
            let config = load_config(&config)?;
            println!(
                "configuration ok: {} route(s), program `{}`",
                config.api.len(),
                config.command.program
            );
            Ok(())
        }
        Commands::Start { config, port } => {
            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => GatewayConfig::default(),
            };
            if let Some(port) = port {
                let mut addr: SocketAddr = config.listener.bind_address.parse()?;
                addr.set_port(port);
                config.listener.bind_address = addr.to_string();
            }
            start(config).await
        }
    }
}

async fn start(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(&config.observability);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        program = %config.command.program,
        routes = config.api.len(),
        tmp_root = %config.uploads.tmp_root.display(),
        "command-gateway v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = GatewayServer::new(config)?;
    let mut serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut serving => result??,
        _ = shutdown.trigger_on(shutdown_signal()) => serving.await??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
