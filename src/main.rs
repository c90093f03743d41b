use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod errors;
mod handlers;
mod metadata;
mod models;
mod mount;
mod routes;
mod services;
mod state;
mod store;

use config::{AppConfig, BrowseArgs, Command};
use metadata::MetadataRepository;
use mount::{
    client::GatewayClient,
    context::MountStorageContext,
    probe::HttpProbe,
    url_cache::UrlCache,
    view::{MountView, Node},
};
use services::{
    download_service::ObjectDownloadService, listing_service::ObjectListingService,
    url_signer::HmacUrlSigner,
};
use store::local::LocalObjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    match command {
        Command::Serve => serve(cfg).await,
        Command::Migrate => migrate(&cfg).await,
        Command::Browse(args) => browse(&cfg, args).await,
    }
}

/// Open the SQLite metadata store, creating its file and directory if needed.
async fn connect_metadata(cfg: &AppConfig) -> Result<MetadataRepository> {
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:")
        .split('?')
        .next()
        .unwrap_or_default();
    if !db_path.is_empty() && !db_path.contains(":memory:") {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        if let Err(e) = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path_obj)
        {
            tracing::warn!("Failed to open database file manually: {}", e);
        }
    }

    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .with_context(|| format!("connecting to {}", db_url))?;
    Ok(MetadataRepository::new(Arc::new(db)))
}

async fn migrate(cfg: &AppConfig) -> Result<()> {
    let metadata = connect_metadata(cfg).await?;
    metadata.run_migrations().await?;
    tracing::info!("Database migration complete.");
    Ok(())
}

async fn serve(cfg: AppConfig) -> Result<()> {
    cfg.validate()?;
    tracing::info!(
        addr = %cfg.addr(),
        storage_dir = %cfg.storage_dir,
        data_bucket = %cfg.data_bucket,
        state_bucket = %cfg.state_bucket,
        pool_size = cfg.pool_size,
        key_size = cfg.key_size,
        part_size = cfg.part_size,
        url_expiration_hours = cfg.url_expiration.num_hours(),
        "Starting object-gateway"
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let metadata = connect_metadata(&cfg).await?;

    // --- Initialize core services ---
    let resolver = cfg.resolver()?;
    let blobs = LocalObjectStore::new(&cfg.storage_dir);
    let store = Arc::new(blobs.clone());
    let signer = Arc::new(HmacUrlSigner::new(&cfg.public_url, &cfg.signing_secret)?);
    let downloads = ObjectDownloadService::new(
        cfg.download_config(),
        resolver,
        cfg.part_calculator()?,
        store.clone(),
        signer.clone(),
    );
    let listings =
        ObjectListingService::new(store, resolver, cfg.data_bucket.clone(), cfg.data_dir.clone());

    let app_state = state::AppState {
        downloads,
        listings,
        metadata,
        blobs,
        signer,
    };
    let auth = auth::AuthState {
        tokens: Arc::new(cfg.tokens()?),
        required_scope: cfg.download_scope.clone(),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(app_state, auth);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn browse(cfg: &AppConfig, args: BrowseArgs) -> Result<()> {
    let gateway_url = args
        .gateway_url
        .or_else(|| std::env::var("OBJECT_GATEWAY_URL").ok())
        .unwrap_or_else(|| format!("http://localhost:{}", cfg.port));
    let token = args
        .token
        .or_else(|| std::env::var("OBJECT_GATEWAY_TOKEN").ok());

    let http = reqwest::Client::new();
    let client = GatewayClient::new(http.clone(), &gateway_url, token);
    let (entities, objects) = tokio::try_join!(client.find_entities(), client.list_objects())?;
    tracing::info!(
        entities = entities.len(),
        objects = objects.len(),
        "Fetched gateway snapshot"
    );

    let context = MountStorageContext::new(
        Arc::new(client),
        Arc::new(HttpProbe::new(http)),
        UrlCache::for_url_expiration(cfg.url_expiration.to_std()?),
        entities,
        objects,
    );
    let view = MountView::new(Arc::new(context), args.layout);

    if !view.context().is_authorized().await? {
        tracing::warn!("Signed URLs are refused for the current credentials");
        println!("authorized: false");
    }

    if args.url {
        println!("{}", view.url(&args.path).await?);
        return Ok(());
    }

    match view.lookup(&args.path)? {
        Node::File { path, file } => {
            println!("{}\t{}\t{}\t{}", path, file.object_id, file.size, file.last_modified);
            println!("parent\t{}", view.parent(&path));
            for (kind, index) in view.index_files(&path)? {
                println!("{}\t{}\t{}", kind.extension(), index.file_name, index.object_id);
            }
        }
        Node::Directory { path } => {
            for entry in view.list(&path)? {
                let kind = if entry.is_dir { "d" } else { "-" };
                println!("{} {:>14} {}", kind, entry.size, entry.name);
            }
        }
    }

    tracing::debug!(metrics = ?view.context().metrics(), "mount counters");
    Ok(())
}
