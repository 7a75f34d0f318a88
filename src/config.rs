use std::{env, path::PathBuf};

use crate::error::{BridgeError, BridgeResult};

pub const DEFAULT_SCOPES: &str = "content timeline oauth tickets e-commerce \
crm.objects.contacts.read crm.objects.contacts.write crm.objects.custom.read \
crm.objects.custom.write crm.objects.companies.write crm.schemas.contacts.read \
crm.objects.companies.read crm.objects.deals.read crm.objects.deals.write \
crm.schemas.contacts.write crm.schemas.deals.read crm.schemas.deals.write \
crm.objects.line_items.read crm.objects.line_items.write crm.objects.users.read \
crm.objects.users.write";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PORTAL_ID: &str = "26122306";
const DEFAULT_API_BASE: &str = "https://api.hubapi.com";
const DEFAULT_AUTHORIZE_URL: &str = "https://app.hubspot.com/oauth/authorize";

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub port: u16,
    pub refresh_token_path: PathBuf,
    /// Portal whose credential is restored at startup and used for VideoAsk events.
    pub portal_id: String,
    pub api_base: String,
    pub authorize_url: String,
}

impl Config {
    pub fn from_env() -> BridgeResult<Self> {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            client_id: required("CLIENT_ID")?,
            client_secret: required("CLIENT_SECRET")?,
            redirect_uri: required("REDIRECT_URI")?,
            scopes: optional("SCOPES").unwrap_or_else(|| DEFAULT_SCOPES.to_string()),
            port,
            refresh_token_path: optional("REFRESH_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("refresh_token.txt")),
            portal_id: optional("HUBSPOT_PORTAL_ID")
                .unwrap_or_else(|| DEFAULT_PORTAL_ID.to_string()),
            api_base: optional("HUBSPOT_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            authorize_url: optional("HUBSPOT_AUTHORIZE_URL")
                .unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string()),
        })
    }

    /// Tenant key of the portal configured for startup bootstrap.
    pub fn default_tenant(&self) -> String {
        crate::token_store::tenant_key(&self.portal_id)
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &str) -> BridgeResult<String> {
    optional(name).ok_or_else(|| BridgeError::Config(format!("{name} is not set")))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        redirect_uri: "http://localhost:3000/callback".to_string(),
        scopes: "oauth crm.objects.contacts.write".to_string(),
        port: DEFAULT_PORT,
        refresh_token_path: PathBuf::from("refresh_token.txt"),
        portal_id: "42".to_string(),
        api_base: DEFAULT_API_BASE.to_string(),
        authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
    }
}
