//! Frontline: marketplace API server.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use frontline_server::{auth, build_router, AppState};

fn resolve_data_dir() -> PathBuf {
    std::env::var("FRONTLINE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn open_state(data_dir: &std::path::Path) -> anyhow::Result<AppState> {
    let config = frontline_core::FrontlineConfig::from_env(data_dir)?;
    let store = frontline_store::SqliteStore::open(&config.data_paths.db_dir)
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
    Ok(AppState::new(config, store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "purge-sessions" => {
                let state = open_state(&resolve_data_dir())?;
                let purged = state
                    .store
                    .purge_expired_sessions()
                    .map_err(|e| anyhow::anyhow!("Purge failed: {}", e))?;
                println!("Purged {} expired sessions", purged);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("Frontline: marketplace API server");
                println!();
                println!("Usage: frontline [command]");
                println!();
                println!("Commands:");
                println!("  (none)            Start the server");
                println!("  purge-sessions    Delete expired bearer sessions and exit");
                println!("  help              Show this help message");
                println!();
                println!("Environment:");
                println!("  PORT                         HTTP port (default 5000)");
                println!("  FRONTLINE_DATA_DIR           Data directory (default ./data)");
                println!("  FRONTLINE_SESSION_TTL_HOURS  Session lifetime (default 168)");
                println!("  RUST_LOG                     Log filter (default info)");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'frontline help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let state = Arc::new(open_state(&data_dir)?);
    let port = state.config.port;

    auth::start_session_sweeper(state.clone());

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Frontline server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
