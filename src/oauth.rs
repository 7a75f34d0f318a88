use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    crm::{CrmApi, Registration},
    error::{BridgeError, BridgeResult},
    properties,
    token_store::{tenant_key, RefreshTokenFile, TokenCache},
    types::{AccessTokenInfo, TenantCredential, TokenResponse},
};

/// Tokens expiring within this many seconds are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 60;
/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 1800;

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> BridgeResult<TokenResponse>;

    async fn exchange_code(&self, code: &str) -> BridgeResult<TokenResponse>;

    async fn access_token_info(&self, access_token: &str) -> BridgeResult<AccessTokenInfo>;
}

#[derive(Clone)]
pub struct HubSpotOAuth {
    client: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl HubSpotOAuth {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            api_base: config.api_base.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }

    async fn token_request(
        &self,
        operation: &'static str,
        grant: [(&str, &str); 2],
    ) -> BridgeResult<TokenResponse> {
        let form = [
            grant[0],
            grant[1],
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        let response = self
            .client
            .post(format!("{}/oauth/v1/token", self.api_base))
            .form(&form)
            .send()
            .await?;
        let response = BridgeError::check_response(operation, response).await?;
        Ok(response.json::<TokenResponse>().await?)
    }
}

#[async_trait]
impl OAuthProvider for HubSpotOAuth {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> BridgeResult<TokenResponse> {
        self.token_request(
            "refresh token exchange",
            [("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
        )
        .await
    }

    async fn exchange_code(&self, code: &str) -> BridgeResult<TokenResponse> {
        self.token_request(
            "authorization code exchange",
            [("grant_type", "authorization_code"), ("code", code)],
        )
        .await
    }

    async fn access_token_info(&self, access_token: &str) -> BridgeResult<AccessTokenInfo> {
        let mut url = reqwest::Url::parse(&format!("{}/oauth/v1/access-tokens/", self.api_base))
            .map_err(|err| BridgeError::Config(format!("invalid api base: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| BridgeError::Config("api base cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(access_token);
        let response = self.client.get(url).send().await?;
        let response = BridgeError::check_response("access token introspection", response).await?;
        Ok(response.json::<AccessTokenInfo>().await?)
    }
}

/// Owns every tenant credential for the lifetime of the process and hands out
/// access tokens that are valid for at least [`REFRESH_MARGIN_SECS`].
pub struct TokenManager {
    provider: Arc<dyn OAuthProvider>,
    cache: TokenCache,
    refresh_file: RefreshTokenFile,
    bootstrap_tenant: String,
    authorize_url: String,
    client_id: String,
    redirect_uri: String,
    scopes: String,
}

impl TokenManager {
    pub fn new(provider: Arc<dyn OAuthProvider>, config: &Config) -> Self {
        Self {
            provider,
            cache: TokenCache::new(),
            refresh_file: RefreshTokenFile::new(config.refresh_token_path.clone()),
            bootstrap_tenant: config.default_tenant(),
            authorize_url: config.authorize_url.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
        }
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Consent page the `/authorize` route redirects to.
    pub fn authorization_url(&self) -> BridgeResult<String> {
        let mut url = reqwest::Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", self.scopes.as_str()),
                ("response_type", "code"),
            ],
        )
        .map_err(|err| BridgeError::Config(format!("invalid authorize url: {err}")))?;
        // Form encoding writes spaces as `+` and a literal `+` as `%2B`; the
        // consent page expects the scope list separated by `%20`.
        let query = url.query().map(|query| query.replace('+', "%20"));
        url.set_query(query.as_deref());
        Ok(url.to_string())
    }

    /// Restores the bootstrap tenant from the persisted refresh token.
    ///
    /// Returns `Ok(None)` when nothing is persisted; the service then starts
    /// unauthenticated until `/callback` completes.
    pub async fn bootstrap(&self) -> BridgeResult<Option<TenantCredential>> {
        let Some(refresh_token) = self.refresh_file.load().await? else {
            info!(
                path = %self.refresh_file.path().display(),
                "no persisted refresh token, starting unauthenticated"
            );
            return Ok(None);
        };

        let credential = self
            .refresh(&self.bootstrap_tenant, &refresh_token)
            .await?;
        info!(tenant = %credential.tenant_id, "restored credential from refresh token");
        Ok(Some(credential))
    }

    /// Returns an access token for `tenant_id`, refreshing it first when it
    /// expires within [`REFRESH_MARGIN_SECS`].
    pub async fn ensure_valid(&self, tenant_id: &str) -> BridgeResult<String> {
        let credential = self
            .cache
            .get(tenant_id)
            .await
            .ok_or_else(|| BridgeError::CredentialNotFound(tenant_id.to_string()))?;
        if !needs_refresh(&credential, Utc::now().timestamp()) {
            return Ok(credential.access_token);
        }

        let lock = self.cache.refresh_lock(tenant_id).await;
        let _guard = lock.lock().await;

        // Another task may have refreshed while we waited.
        let credential = self
            .cache
            .get(tenant_id)
            .await
            .ok_or_else(|| BridgeError::CredentialNotFound(tenant_id.to_string()))?;
        if !needs_refresh(&credential, Utc::now().timestamp()) {
            return Ok(credential.access_token);
        }

        info!(tenant = tenant_id, expires_at = credential.expires_at, "refreshing access token");
        let refreshed = self.refresh(tenant_id, &credential.refresh_token).await?;
        Ok(refreshed.access_token)
    }

    /// Completes the OAuth authorization-code flow for a newly connected portal.
    pub async fn authorize(
        &self,
        code: &str,
        crm: &dyn CrmApi,
    ) -> BridgeResult<TenantCredential> {
        let tokens = self.provider.exchange_code(code).await?;
        let info = self.provider.access_token_info(&tokens.access_token).await?;
        let credential = credential_from(tenant_key(info.hub_id), tokens, Utc::now().timestamp());

        self.cache.set(credential.clone()).await;
        self.refresh_file.store(&credential.refresh_token).await?;
        info!(
            tenant = %credential.tenant_id,
            hub_id = info.hub_id,
            user = info.user.as_deref().unwrap_or(""),
            "portal authorized"
        );

        match crm
            .create_property_group(&credential.access_token, &properties::property_group())
            .await
        {
            Ok(Registration::Created) => {
                info!(group = properties::PROPERTY_GROUP, "property group created")
            }
            Ok(Registration::AlreadyExists) => {
                info!(group = properties::PROPERTY_GROUP, "property group already exists")
            }
            Err(err) => warn!(
                group = properties::PROPERTY_GROUP,
                error = %err,
                "property group creation failed"
            ),
        }

        Ok(credential)
    }

    async fn refresh(
        &self,
        tenant_id: &str,
        refresh_token: &str,
    ) -> BridgeResult<TenantCredential> {
        let tokens = self
            .provider
            .exchange_refresh_token(refresh_token)
            .await
            .map_err(|err| BridgeError::TokenRefreshFailed(err.to_string()))?;
        let credential = credential_from(tenant_id.to_string(), tokens, Utc::now().timestamp());

        self.cache.set(credential.clone()).await;
        if let Err(err) = self.refresh_file.store(&credential.refresh_token).await {
            error!(
                tenant = tenant_id,
                path = %self.refresh_file.path().display(),
                error = %err,
                "failed to persist rotated refresh token"
            );
        }
        Ok(credential)
    }
}

fn needs_refresh(credential: &TenantCredential, now: i64) -> bool {
    credential.expires_at - now < REFRESH_MARGIN_SECS
}

fn credential_from(tenant_id: String, tokens: TokenResponse, now: i64) -> TenantCredential {
    TenantCredential {
        tenant_id,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_at: now + tokens.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS),
    }
}
