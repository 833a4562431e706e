use std::sync::Arc;

use archiiv_store::RecordStore;

use crate::auth::{AuthProvider, Authorizer};
use crate::error::{ServerError, ServerResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub authorizer: Arc<dyn Authorizer>,
}

impl AppState {
    pub fn new(
        store: Arc<RecordStore>,
        auth: Arc<dyn AuthProvider>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            store,
            auth,
            authorizer,
        }
    }

    /// Run store work on the blocking pool; every store call may block on
    /// disk I/O.
    pub async fn blocking<T, F>(&self, work: F) -> ServerResult<T>
    where
        F: FnOnce(&RecordStore, &dyn Authorizer) -> ServerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let authorizer = Arc::clone(&self.authorizer);
        tokio::task::spawn_blocking(move || work(&store, authorizer.as_ref()))
            .await
            .map_err(|e| ServerError::Internal(format!("blocking task failed: {e}")))?
    }
}
