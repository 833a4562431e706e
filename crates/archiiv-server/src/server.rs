use std::sync::Arc;

use archiiv_crypto::TokenSecret;
use archiiv_store::RecordStore;
use tokio::net::TcpListener;

use crate::auth::{MetaAuthorizer, TokenAuth};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;
use crate::users::UserStore;

/// Archiiv file server.
pub struct ArchiivServer {
    config: ServerConfig,
    state: AppState,
}

impl ArchiivServer {
    /// Open the record store and user file named by `config`.
    pub fn open(config: ServerConfig, secret: TokenSecret) -> ServerResult<Self> {
        config.validate()?;
        let store = RecordStore::open(&config.fs_root, config.root()?)?;
        let users = Arc::new(UserStore::load(&config.users_path)?);
        let auth = TokenAuth::new(secret, config.token_max_age(), users);
        let state = AppState::new(Arc::new(store), Arc::new(auth), Arc::new(MetaAuthorizer));
        Ok(Self { config, state })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), &self.config)
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            root = %self.state.store.root(),
            "archiiv server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        tracing::info!("archiiv server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archiiv_store::init_store_dir;

    #[test]
    fn open_initialized_directory() {
        let dir = tempfile::tempdir().unwrap();
        let layout = init_store_dir(dir.path()).unwrap();
        let config = ServerConfig::default().with_layout(&layout);
        let server = ArchiivServer::open(config, TokenSecret::generate()).unwrap();
        assert_eq!(server.state().store.root(), layout.root);
        let _router = server.router();
    }

    #[test]
    fn open_without_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = init_store_dir(dir.path()).unwrap();
        let mut config = ServerConfig::default().with_layout(&layout);
        config.root_id = None;
        assert!(matches!(
            ArchiivServer::open(config, TokenSecret::generate()),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn open_wrong_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let layout = init_store_dir(dir.path()).unwrap();
        let mut config = ServerConfig::default().with_layout(&layout);
        config.root_id = Some(archiiv_types::RecordId::new());
        assert!(matches!(
            ArchiivServer::open(config, TokenSecret::generate()),
            Err(ServerError::Store(_))
        ));
    }
}
