use dotenv::dotenv;
use examguard_server::{router, AppState, AttemptStore, MemoryStore, MongoStore, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match ServerConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[error] {}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn AttemptStore> = match &config.mongo_uri {
        Some(uri) => match MongoStore::connect(uri, &config.db_name).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                eprintln!("[error] failed to connect to database: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("[server] MONGO_URI not set, violations are kept in memory only");
            Arc::new(MemoryStore::default())
        }
    };

    let app = router(Arc::new(AppState::new(store, config.max_warnings)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("[server] started on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("[error] could not bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("[error] server stopped: {}", e);
        std::process::exit(1);
    }
}
