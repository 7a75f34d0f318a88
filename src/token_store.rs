use std::{
    collections::HashMap,
    fmt::Display,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::{Mutex, RwLock};

use crate::{error::BridgeResult, types::TenantCredential};

pub fn tenant_key(portal_id: impl Display) -> String {
    format!("user_{portal_id}")
}

/// Process-local credential store, one entry per tenant.
///
/// Expiry is not enforced here; `TokenManager` decides when to refresh.
#[derive(Default)]
pub struct TokenCache {
    credentials: RwLock<HashMap<String, TenantCredential>>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, tenant_id: &str) -> Option<TenantCredential> {
        self.credentials.read().await.get(tenant_id).cloned()
    }

    pub async fn set(&self, credential: TenantCredential) {
        self.credentials
            .write()
            .await
            .insert(credential.tenant_id.clone(), credential);
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    /// Lock serializing check-then-refresh for one tenant.
    pub async fn refresh_lock(&self, tenant_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(tenant_id.to_string())
            .or_default()
            .clone()
    }
}

/// Plain-text file holding the latest refresh token of the bootstrap tenant.
#[derive(Debug, Clone)]
pub struct RefreshTokenFile {
    path: PathBuf,
}

impl RefreshTokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when the file is missing or blank.
    pub async fn load(&self) -> BridgeResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn store(&self, refresh_token: &str) -> BridgeResult<()> {
        tokio::fs::write(&self.path, refresh_token).await?;
        Ok(())
    }
}
