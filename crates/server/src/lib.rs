//! The aibox gateway server: state assembly, routing, and the serve
//! loop.
//!
//! Provides a reusable `serve` function driven by the binary, plus
//! `router`/`build_state` seams the tests use without binding a socket.

mod admin;
mod chat;
mod context;
mod error;
mod files;
mod interceptor;
mod validation;
mod wire;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use axum::Router;
use axum::routing::{delete, get, post};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;

use auth::{KeyStore, RateLimiter, RateLimits};
use config::EnvConfig;
use kv::KvClient;
use llm::ProviderRegistry;
use rag::{OllamaEmbedder, QdrantStore, RagService};
use tenant::TenantManager;

pub use context::RequestContext;
pub use error::ServiceError;
pub use wire::{GenerateRequest, GenerateResponse, ProviderOverride};

/// Shared state behind every handler.
pub struct AppState {
    /// Environment configuration.
    pub env: EnvConfig,
    /// KV backend (Redis, or memory in development fallback).
    pub kv: KvClient,
    /// API-key store.
    pub keys: KeyStore,
    /// Sliding-window rate limiter.
    pub limiter: RateLimiter,
    /// Tenant snapshot manager.
    pub tenants: TenantManager,
    /// Provider adapter registry.
    pub registry: ProviderRegistry,
    /// RAG orchestration, when enabled.
    pub rag: Option<Arc<RagService>>,
    /// Development-mode auth stub: set only when the KV store was
    /// unreachable outside production. Never true in production mode.
    pub dev_auth_stub: bool,
}

/// Assemble the application state from configuration.
pub async fn build_state(env: EnvConfig) -> anyhow::Result<Arc<AppState>> {
    let (kv, dev_auth_stub) = match KvClient::connect(&env.redis).await {
        Ok(kv) => (kv, false),
        Err(e) if !env.mode.is_production() => {
            log::warn!(
                "KV store at {} is unreachable ({e}); continuing with an in-memory store and a \
                 DEVELOPMENT AUTH STUB that grants every request admin permissions. \
                 This must never serve real traffic.",
                env.redis.addr
            );
            (KvClient::in_memory(), true)
        }
        Err(e) => {
            return Err(anyhow!("KV store at {} is unreachable in production mode: {e}", env.redis.addr));
        }
    };

    let tenants = match TenantManager::load(env.configs_dir.clone()).await {
        Ok(tenants) => tenants,
        Err(e) if !env.mode.is_production() => {
            log::warn!(
                "tenant configs unavailable ({e}); starting with zero tenants. \
                 Reload after populating {}.",
                env.configs_dir.display()
            );
            TenantManager::empty(env.configs_dir.clone())
        }
        Err(e) => return Err(anyhow::Error::new(e).context("loading tenant configs")),
    };

    let registry = ProviderRegistry::new().map_err(|e| anyhow!("building provider registry: {e}"))?;

    let rag = if env.rag.enabled {
        let store = QdrantStore::new(&env.rag).map_err(|e| anyhow!("building vector store client: {e}"))?;
        let embedder = OllamaEmbedder::new(&env.rag).map_err(|e| anyhow!("building embedder client: {e}"))?;
        Some(Arc::new(RagService::new(Arc::new(store), Arc::new(embedder), &env.rag)))
    } else {
        log::info!("RAG subsystem disabled");
        None
    };

    let keys = KeyStore::new(kv.clone());
    let limiter = RateLimiter::new(kv.clone(), RateLimits::default());

    Ok(Arc::new(AppState {
        env,
        kv,
        keys,
        limiter,
        tenants,
        registry,
        rag,
        dev_auth_stub,
    }))
}

/// Build the public router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(admin::health))
        .route("/v1/chat/reply", post(chat::generate_reply))
        .route("/v1/chat/reply/stream", post(chat::generate_reply_stream))
        .route("/v1/chat/provider", post(chat::select_provider))
        .route("/v1/admin/ready", get(admin::ready))
        .route("/v1/admin/version", get(admin::version))
        .route("/v1/admin/keys", post(admin::issue_key).get(admin::list_keys))
        .route("/v1/admin/keys/{key_id}", delete(admin::revoke_key))
        .route("/v1/admin/tenants/reload", post(admin::reload_tenants))
        .route("/v1/files/stores", post(files::create_store).get(files::list_stores))
        .route(
            "/v1/files/stores/{store_id}",
            get(files::get_store).delete(files::delete_store),
        )
        .route("/v1/files/stores/{store_id}/files", post(files::upload_file))
        .layer(axum::middleware::from_fn_with_state(state.clone(), interceptor::intercept))
        .with_state(state)
}

/// Start and run the gateway.
pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let listen_address: SocketAddr = format!("{}:{}", state.env.host, state.env.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", state.env.host, state.env.port))?;

    let tls = state.env.tls.clone();
    let app = router(state);

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("failed to bind to {listen_address}: {e}"))?;

    match tls {
        Some(tls_config) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls_config.certificate, &tls_config.key)
                .await
                .map_err(|e| anyhow!("failed to load TLS certificate and key: {e}"))?;

            log::info!("gateway listening at https://{listen_address}");

            let std_listener = listener.into_std()?;
            axum_server::from_tcp_rustls(std_listener, rustls_config)
                .serve(app.into_make_service())
                .await
                .map_err(|e| anyhow!("HTTPS server failed: {e}"))?;
        }
        None => {
            log::info!("gateway listening at http://{listen_address}");

            axum::serve(listener, app)
                .await
                .map_err(|e| anyhow!("HTTP server failed: {e}"))?;
        }
    }

    Ok(())
}
