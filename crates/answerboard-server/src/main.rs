mod cleanup;
mod settings;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use answerboard_api::AppStateInner;
use answerboard_cache::{CacheManager, KvStore, MemoryStore};
use answerboard_core::{ScriptLock, Services, SystemAdmins};
use answerboard_db::Database;
use answerboard_sheets::{
    DriveShareRepair, MemorySheets, ServiceAccountAuth, ServiceAccountKey, SheetsApiClient,
    SheetsBackend,
};

use crate::settings::{Settings, SheetsBackendKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "answerboard=debug,tower_http=debug".into()),
        )
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("FATAL: {e:#}");
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Cache tiers: process memory, then the properties table.
    let db = Arc::new(Database::open(&settings.db_path)?);
    let shared = Arc::new(MemoryStore::new());
    let durable: Arc<dyn KvStore> = db.clone();
    let cache = Arc::new(CacheManager::new(shared.clone(), Some(durable)));

    let sheets = sheets_backend(&settings, &cache)?;

    let admins = SystemAdmins::from_csv(&settings.admin_emails);
    if admins.is_empty() {
        warn!("BOARD_ADMIN_EMAILS is empty; no system administrators configured");
    } else {
        info!("{} system administrator(s) configured", admins.len());
    }

    let services = Services::new(
        db.clone(),
        sheets,
        admins,
        ScriptLock::new(settings.lock_timeout),
    );

    tokio::spawn(cleanup::run_cleanup_loop(
        db,
        shared,
        settings.cleanup_interval_secs,
    ));

    if settings.dev_login {
        warn!("BOARD_DEV_LOGIN is enabled; /auth/dev-login issues sessions for any email");
    }

    let state = Arc::new(AppStateInner {
        services,
        cache,
        session_secret: settings.session_secret.clone(),
        public_url: settings.public_url.clone(),
        dev_login: settings.dev_login,
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    let app = answerboard_api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    info!("Answer board listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn sheets_backend(settings: &Settings, cache: &Arc<CacheManager>) -> anyhow::Result<Arc<dyn SheetsBackend>> {
    match settings.sheets_backend {
        SheetsBackendKind::Memory => {
            warn!("Using the in-memory spreadsheet backend; data is lost on restart");
            Ok(Arc::new(MemorySheets::new()))
        }
        SheetsBackendKind::Api => {
            let path = settings
                .service_account_file
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("BOARD_SERVICE_ACCOUNT_FILE is not set"))?;
            let key = ServiceAccountKey::from_file(path)?;
            let http = reqwest::Client::new();
            let auth = Arc::new(ServiceAccountAuth::new(key, http.clone(), cache.clone()));
            info!("Sheets API as {}", auth.client_email());

            let mut client = SheetsApiClient::new(http.clone(), auth.clone());
            match &settings.drive_delegate {
                Some(delegate) => {
                    info!("Drive access repair enabled via {}", delegate);
                    client = client.with_repair(Arc::new(DriveShareRepair::new(http, auth, delegate.clone())));
                }
                None => info!("Drive access repair disabled (BOARD_DRIVE_DELEGATE unset)"),
            }
            Ok(Arc::new(client))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
