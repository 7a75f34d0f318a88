//! In-memory stand-ins for the OAuth provider and the CRM, plus a helper that
//! serves an axum router on an ephemeral port for HTTP client tests.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;
use axum::Router;
use reqwest::StatusCode;

use crate::{
    crm::{CrmApi, Registration},
    error::{BridgeError, BridgeResult},
    oauth::OAuthProvider,
    types::{
        AccessTokenInfo, Contact, ContactProperties, PropertyDefinition, PropertyGroupDefinition,
        TokenResponse,
    },
};

/// Serves `app` on 127.0.0.1 and returns its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub struct StubOAuth {
    pub hub_id: u64,
    pub refresh_calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
    refresh_tokens: Mutex<Vec<String>>,
}

impl Default for StubOAuth {
    fn default() -> Self {
        Self::with_hub_id(42)
    }
}

impl StubOAuth {
    pub fn with_hub_id(hub_id: u64) -> Self {
        Self {
            hub_id,
            refresh_calls: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            refresh_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl OAuthProvider for StubOAuth {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> BridgeResult<TokenResponse> {
        self.refresh_tokens
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(BridgeError::upstream(
                "refresh token exchange",
                StatusCode::BAD_REQUEST,
                "invalid_grant".to_string(),
            ));
        }
        // Give concurrent callers a chance to pile up behind the refresh lock.
        tokio::task::yield_now().await;
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenResponse {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
            expires_in: Some(1800),
        })
    }

    async fn exchange_code(&self, code: &str) -> BridgeResult<TokenResponse> {
        Ok(TokenResponse {
            access_token: format!("code-access-{code}"),
            refresh_token: format!("code-refresh-{code}"),
            expires_in: None,
        })
    }

    async fn access_token_info(&self, _access_token: &str) -> BridgeResult<AccessTokenInfo> {
        Ok(AccessTokenInfo {
            hub_id: self.hub_id,
            user: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrmCall {
    CreatePropertyGroup,
    CreateProperty(String),
    Search(String),
    GetContact(String),
    CreateContact(ContactProperties),
    UpdateContact(String, ContactProperties),
}

/// Records every call. Property and group names listed in `existing_properties`
/// answer `AlreadyExists`, those in `failing_properties` fail with a 500.
#[derive(Default)]
pub struct RecordingCrm {
    pub existing_properties: Mutex<Vec<String>>,
    pub failing_properties: Mutex<Vec<String>>,
    pub contacts: Mutex<Vec<Contact>>,
    pub fail_search: AtomicBool,
    calls: Mutex<Vec<CrmCall>>,
}

impl RecordingCrm {
    pub fn with_contact(id: &str, firstname: &str, lastname: &str) -> Self {
        let crm = Self::default();
        let properties = [
            ("firstname".to_string(), Some(firstname.to_string())),
            ("lastname".to_string(), Some(lastname.to_string())),
        ]
        .into_iter()
        .collect();
        crm.contacts.lock().unwrap().push(Contact {
            id: id.to_string(),
            properties,
        });
        crm
    }

    pub fn calls(&self) -> Vec<CrmCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: CrmCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn registration(&self, name: &str) -> BridgeResult<Registration> {
        if self.failing_properties.lock().unwrap().iter().any(|p| p == name) {
            return Err(BridgeError::upstream(
                "create property",
                StatusCode::INTERNAL_SERVER_ERROR,
                "boom".to_string(),
            ));
        }
        if self.existing_properties.lock().unwrap().iter().any(|p| p == name) {
            return Ok(Registration::AlreadyExists);
        }
        self.existing_properties.lock().unwrap().push(name.to_string());
        Ok(Registration::Created)
    }
}

fn contact_from(id: &str, properties: &ContactProperties) -> Contact {
    Contact {
        id: id.to_string(),
        properties: properties
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect(),
    }
}

#[async_trait]
impl CrmApi for RecordingCrm {
    async fn create_property_group(
        &self,
        _access_token: &str,
        group: &PropertyGroupDefinition,
    ) -> BridgeResult<Registration> {
        self.record(CrmCall::CreatePropertyGroup);
        self.registration(&group.name)
    }

    async fn create_property(
        &self,
        _access_token: &str,
        property: &PropertyDefinition,
    ) -> BridgeResult<Registration> {
        self.record(CrmCall::CreateProperty(property.name.clone()));
        self.registration(&property.name)
    }

    async fn search_contacts_by_email(
        &self,
        _access_token: &str,
        email: &str,
    ) -> BridgeResult<Vec<Contact>> {
        self.record(CrmCall::Search(email.to_string()));
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(BridgeError::upstream(
                "search contacts",
                StatusCode::BAD_GATEWAY,
                String::new(),
            ));
        }
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn get_contact(&self, _access_token: &str, contact_id: &str) -> BridgeResult<Contact> {
        self.record(CrmCall::GetContact(contact_id.to_string()));
        self.contacts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == contact_id)
            .cloned()
            .ok_or_else(|| {
                BridgeError::upstream("get contact", StatusCode::NOT_FOUND, String::new())
            })
    }

    async fn create_contact(
        &self,
        _access_token: &str,
        properties: &ContactProperties,
    ) -> BridgeResult<Contact> {
        self.record(CrmCall::CreateContact(properties.clone()));
        Ok(contact_from("new-contact", properties))
    }

    async fn update_contact(
        &self,
        _access_token: &str,
        contact_id: &str,
        properties: &ContactProperties,
    ) -> BridgeResult<Contact> {
        self.record(CrmCall::UpdateContact(
            contact_id.to_string(),
            properties.clone(),
        ));
        Ok(contact_from(contact_id, properties))
    }
}
