use std::{collections::HashMap, future::Future, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{
    aggregate::aggregate_answers,
    config::Config,
    crm::{CrmApi, HubSpotCrm},
    error::{BridgeError, BridgeResult},
    oauth::{HubSpotOAuth, OAuthProvider, TokenManager},
    token_store::tenant_key,
    types::{PropertyChangeEvent, VideoAskEvent},
    upsert::{fix_contact_name, upsert_contact, ContactUpsertRequest, UpsertOutcome},
};

pub struct AppState {
    config: Config,
    tokens: TokenManager,
    crm: Arc<dyn CrmApi>,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn OAuthProvider>, crm: Arc<dyn CrmApi>) -> Self {
        let tokens = TokenManager::new(provider, &config);
        Self {
            config,
            tokens,
            crm,
        }
    }
}

/// Runs `job` in the background so the webhook sender gets its response at
/// once. The outcome only shows up in the logs.
fn spawn_job<F>(kind: &'static str, job: F)
where
    F: Future<Output = BridgeResult<()>> + Send + 'static,
{
    let span = info_span!("job", kind, job_id = %Uuid::new_v4());
    tokio::spawn(
        async move {
            match job.await {
                Ok(()) => info!("job finished"),
                Err(err) => error!(error = %err, "job failed"),
            }
        }
        .instrument(span),
    );
}

async fn sync_videoask_submission(state: Arc<AppState>, body: Bytes) -> BridgeResult<()> {
    let event = serde_json::from_slice::<VideoAskEvent>(&body)?;
    let email = event
        .contact
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or_else(|| BridgeError::InvalidPayload("contact.email is missing".to_string()))?;

    let tenant = state.config.default_tenant();
    let access_token = state.tokens.ensure_valid(&tenant).await?;

    let answers = aggregate_answers(
        state.crm.as_ref(),
        &access_token,
        &event.form.questions,
        &event.contact.answers,
    )
    .await;
    if answers.is_empty() {
        debug!("submission carried no usable answers");
    }
    let request =
        ContactUpsertRequest::new(email, event.contact.name.as_deref(), answers.to_properties());
    let (action, contact_id) =
        match upsert_contact(state.crm.as_ref(), &access_token, &request).await? {
            UpsertOutcome::Created(id) => ("created", id),
            UpsertOutcome::Updated(id) => ("updated", id),
        };
    info!(
        tenant = %tenant,
        action,
        contact_id = %contact_id,
        answers = answers.len(),
        "videoask submission synced"
    );
    Ok(())
}

async fn fix_changed_contact_name(state: Arc<AppState>, body: Bytes) -> BridgeResult<()> {
    let events = serde_json::from_slice::<Vec<PropertyChangeEvent>>(&body)?;
    let event = events
        .into_iter()
        .next()
        .ok_or_else(|| BridgeError::InvalidPayload("empty event batch".to_string()))?;
    let portal_id = event
        .portal_id
        .ok_or_else(|| BridgeError::InvalidPayload("portalId is missing".to_string()))?;
    let object_id = event
        .object_id
        .ok_or_else(|| BridgeError::InvalidPayload("objectId is missing".to_string()))?;

    let tenant = tenant_key(portal_id);
    let access_token = state.tokens.ensure_valid(&tenant).await?;
    let contact_id = object_id.to_string();
    let fixed = fix_contact_name(state.crm.as_ref(), &access_token, &contact_id).await?;
    info!(
        tenant = %tenant,
        contact_id = %contact_id,
        property = event.property_name.as_deref().unwrap_or(""),
        value = event.property_value.as_deref().unwrap_or(""),
        renamed = fixed.is_some(),
        "contact name change handled"
    );
    Ok(())
}

async fn authorize(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.tokens.authorization_url() {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(err) => {
            error!(error = %err, "unable to build authorization url");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error during authorization.").into_response()
        }
    }
}

async fn callback(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let Some(code) = params.get("code").filter(|code| !code.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing authorization code.").into_response();
    };

    match state.tokens.authorize(code, state.crm.as_ref()).await {
        Ok(_) => (StatusCode::OK, "Authorization successful!").into_response(),
        Err(err) => {
            error!(error = %err, "authorization failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error during authorization.").into_response()
        }
    }
}

async fn videoask_webhook(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    spawn_job("videoask", sync_videoask_submission(state, body));
    StatusCode::NO_CONTENT
}

async fn contact_name_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> impl IntoResponse {
    spawn_job("contactname", fix_changed_contact_name(state, body));
    StatusCode::NO_CONTENT
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "now": Utc::now().to_rfc3339() }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/authorize", get(authorize))
        .route("/callback", get(callback))
        .route("/videoask", post(videoask_webhook))
        .route("/contactname", post(contact_name_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

pub async fn run() -> BridgeResult<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env()?;
    let port = config.port;
    let http = reqwest::Client::new();
    let provider = Arc::new(HubSpotOAuth::new(http.clone(), &config));
    let crm = Arc::new(HubSpotCrm::new(http, config.api_base.clone()));
    let state = Arc::new(AppState::new(config, provider, crm));

    state.tokens.bootstrap().await?;

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("videoask bridge running at http://localhost:{port}");
    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        tenants = state.tokens.cache().len().await,
        "server stopped, cached credentials dropped"
    );
    Ok(())
}
