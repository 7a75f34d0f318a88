use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};

/// Contact properties as sent to the CRM, keyed by internal property name.
pub type ContactProperties = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantCredential {
    pub tenant_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenInfo {
    pub hub_id: u64,
    #[serde(default)]
    pub user: Option<String>,
}

// ---------------------------------------------------------------------------
// VideoAsk form webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct VideoAskEvent {
    pub form: VideoAskForm,
    pub contact: VideoAskContact,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoAskForm {
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoAskContact {
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Answer {
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default)]
    pub poll_options: Option<Vec<PollOption>>,
    #[serde(default)]
    pub input_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollOption {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// HubSpot property-change webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyChangeEvent {
    #[serde(default)]
    pub portal_id: Option<u64>,
    #[serde(default)]
    pub object_id: Option<u64>,
    #[serde(default)]
    pub property_name: Option<String>,
    #[serde(default)]
    pub property_value: Option<String>,
}

// ---------------------------------------------------------------------------
// CRM bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyGroupDefinition {
    pub name: String,
    pub display_order: i32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDefinition {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub property_type: String,
    pub field_type: String,
    pub group_name: String,
    pub form_field: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactInput {
    pub properties: ContactProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub properties: HashMap<String, Option<String>>,
}

impl Contact {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(|v| v.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactSearchResponse {
    #[serde(default)]
    pub results: Vec<Contact>,
}
