//! txdata-wb - research-data workbench server and admin commands

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use txdata_common::config::{resolve_config_path, RootFolderInitializer, RootFolderResolver, TomlConfig};
use txdata_common::db::init_database;
use txdata_wb::auth::{self, AdminRequest, ADMIN_INIT_ENV};
use txdata_wb::encoding::manager;
use txdata_wb::workspace::Workspace;
use txdata_wb::{build_router, tutorials, AppState};

/// Command-line arguments for txdata-wb
#[derive(Parser, Debug)]
#[command(name = "txdata-wb")]
#[command(about = "TXdata research-data workbench")]
#[command(version)]
struct Args {
    /// Root folder holding the database, projects and workspaces
    #[arg(long, global = true, env = "TXDATA_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true, env = "TXDATA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long, env = "TXDATA_PORT")]
        port: Option<u16>,
    },
    /// Create an administrator or promote an existing user
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "TXDATA_ADMIN_PASSWORD")]
        password: String,
        /// Must match the ADMIN_INIT_PW environment variable
        #[arg(long)]
        init_key: String,
    },
    /// Load tutorial content from the config file or a JSON/TOML file
    SeedTutorials {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Insert the configured encoder prototypes
    SeedPrototypes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = TomlConfig::load(&config_path).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &config.logging.level;
                format!("txdata_wb={level},txdata_common={level},tower_http=info").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TXdata workbench (txdata-wb) v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", config_path.display());

    let root_folder = RootFolderResolver::new(args.root_folder.clone(), &config).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());
    let pool = match init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            manager::seed_prototypes(&pool, &config.prototypes_or_default()).await?;
            if !config.levels.is_empty() {
                tutorials::seed_tutorials(&pool, &config.levels).await?;
            }

            let host = config.server.host.clone();
            let port = port.unwrap_or(config.server.port);
            let state = AppState::new(
                pool,
                Workspace::new(initializer.projects_path()),
                Workspace::new(initializer.workspace_path()),
                config,
            );
            serve(state, &host, port).await?;
        }
        Command::CreateAdmin {
            email,
            username,
            password,
            init_key,
        } => {
            let configured = std::env::var(ADMIN_INIT_ENV).ok();
            let request = AdminRequest {
                email,
                username,
                password,
                init_key,
            };
            let user = auth::create_admin(&pool, &request, configured.as_deref()).await?;
            info!(user_id = user.id, "Administrator '{}' ready", user.username);
        }
        Command::SeedTutorials { file } => {
            let levels = match file {
                Some(path) => tutorials::load_levels_file(&path)
                    .with_context(|| format!("Failed to read tutorials from {}", path.display()))?,
                None => config.levels.clone(),
            };
            if levels.is_empty() {
                warn!("No tutorial levels to seed");
            }
            let added = tutorials::seed_tutorials(&pool, &levels).await?;
            info!("Added {} tutorial subtopic(s)", added);
        }
        Command::SeedPrototypes => {
            let added = manager::seed_prototypes(&pool, &config.prototypes_or_default()).await?;
            info!("Added {} encoder prototype(s)", added);
        }
    }

    Ok(())
}

async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("txdata-wb listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
