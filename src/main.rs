use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use provwatch::config::{DEFAULT_CONFIG_FILE, Settings};
use provwatch::dispatch::DebouncedDispatcher;
use provwatch::gateway::{HttpGateway, ReloadGateway};
use provwatch::identity::{IdentityBootstrapper, IdentityStore};
use provwatch::watcher::ConfigWatcher;
use provwatch::{log_event, logging};

#[derive(Parser)]
#[command(name = "provwatch")]
#[command(about = "Watches provisioning config and drives control-plane reloads")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap the identity and watch for provisioning changes (default)
    Run,

    /// Show the effective merged configuration
    Config,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init { force } => {
            let path = cli
                .config
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            match Settings::init_config_file(&path, force) {
                Ok(()) => {
                    println!("Wrote {}", path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }

        Commands::Config => match Settings::load(cli.config.as_deref()) {
            Ok(settings) => match toml::to_string_pretty(&settings) {
                Ok(rendered) => {
                    print!("{rendered}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },

        Commands::Run => run(cli.config).await,
    }
}

async fn run(config_file: Option<PathBuf>) -> ExitCode {
    let settings = match Settings::load(config_file.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_with_config(&settings.logging);

    match serve(&settings).await {
        Ok(()) => {
            log_event!("provwatch", "shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            // Fatal errors get exactly one diagnostic line.
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Startup sequence: bootstrap the identity first, only then start
/// watching. Watching runs until a shutdown signal arrives; pending
/// trailing reloads are abandoned at that point.
async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let mut gateway = HttpGateway::new(&settings.gateway)?;

    let store = IdentityStore::new(settings.identity.file.clone());
    let credential = IdentityBootstrapper::new(&store, &gateway, &settings.identity)
        .ensure()
        .await?;
    gateway.set_credential(credential);

    let gateway: Arc<dyn ReloadGateway> = Arc::new(gateway);
    let dispatcher = DebouncedDispatcher::new(
        Duration::from_millis(settings.watch.debounce_ms),
        gateway,
    );
    let watcher = ConfigWatcher::new(settings.watch.root.clone(), dispatcher)?;

    tokio::select! {
        res = watcher.watch() => res.map_err(Into::into),
        _ = shutdown_signal() => {
            log_event!("provwatch", "received shutdown signal");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install ctrl-c handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install sigterm handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
