use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::{
    error::{BridgeError, BridgeResult},
    types::{
        Contact, ContactInput, ContactProperties, ContactSearchResponse, PropertyDefinition,
        PropertyGroupDefinition,
    },
};

/// Outcome of declaring a property or property group on the CRM side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    AlreadyExists,
}

/// Contact-side CRM operations, all authenticated with a tenant access token.
#[async_trait]
pub trait CrmApi: Send + Sync {
    async fn create_property_group(
        &self,
        access_token: &str,
        group: &PropertyGroupDefinition,
    ) -> BridgeResult<Registration>;

    async fn create_property(
        &self,
        access_token: &str,
        property: &PropertyDefinition,
    ) -> BridgeResult<Registration>;

    async fn search_contacts_by_email(
        &self,
        access_token: &str,
        email: &str,
    ) -> BridgeResult<Vec<Contact>>;

    async fn get_contact(&self, access_token: &str, contact_id: &str) -> BridgeResult<Contact>;

    async fn create_contact(
        &self,
        access_token: &str,
        properties: &ContactProperties,
    ) -> BridgeResult<Contact>;

    async fn update_contact(
        &self,
        access_token: &str,
        contact_id: &str,
        properties: &ContactProperties,
    ) -> BridgeResult<Contact>;
}

#[derive(Clone)]
pub struct HubSpotCrm {
    client: reqwest::Client,
    api_base: String,
}

impl HubSpotCrm {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn register<T: serde::Serialize + Sync>(
        &self,
        operation: &'static str,
        path: &str,
        access_token: &str,
        body: &T,
    ) -> BridgeResult<Registration> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await?;
        match BridgeError::check_response(operation, response).await {
            Ok(_) => Ok(Registration::Created),
            Err(err) if err.is_conflict() => Ok(Registration::AlreadyExists),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl CrmApi for HubSpotCrm {
    async fn create_property_group(
        &self,
        access_token: &str,
        group: &PropertyGroupDefinition,
    ) -> BridgeResult<Registration> {
        self.register(
            "create property group",
            "/crm/v3/properties/contacts/groups",
            access_token,
            group,
        )
        .await
    }

    async fn create_property(
        &self,
        access_token: &str,
        property: &PropertyDefinition,
    ) -> BridgeResult<Registration> {
        self.register(
            "create property",
            "/crm/v3/properties/contacts",
            access_token,
            property,
        )
        .await
    }

    async fn search_contacts_by_email(
        &self,
        access_token: &str,
        email: &str,
    ) -> BridgeResult<Vec<Contact>> {
        let response = self
            .client
            .post(self.url("/crm/v3/objects/contacts/search"))
            .bearer_auth(access_token)
            .json(&json!({
                "filterGroups": [{
                    "filters": [{
                        "propertyName": "email",
                        "operator": "EQ",
                        "value": email
                    }]
                }]
            }))
            .send()
            .await?;
        let response = BridgeError::check_response("search contacts", response).await?;
        let payload = response.json::<ContactSearchResponse>().await?;
        debug!(email, matches = payload.results.len(), "contact search finished");
        Ok(payload.results)
    }

    async fn get_contact(&self, access_token: &str, contact_id: &str) -> BridgeResult<Contact> {
        let response = self
            .client
            .get(self.url(&format!("/crm/v3/objects/contacts/{contact_id}")))
            .bearer_auth(access_token)
            .query(&[("properties", "firstname,lastname")])
            .send()
            .await?;
        let response = BridgeError::check_response("get contact", response).await?;
        Ok(response.json::<Contact>().await?)
    }

    async fn create_contact(
        &self,
        access_token: &str,
        properties: &ContactProperties,
    ) -> BridgeResult<Contact> {
        let response = self
            .client
            .post(self.url("/crm/v3/objects/contacts"))
            .bearer_auth(access_token)
            .json(&ContactInput {
                properties: properties.clone(),
            })
            .send()
            .await?;
        let response = BridgeError::check_response("create contact", response).await?;
        Ok(response.json::<Contact>().await?)
    }

    async fn update_contact(
        &self,
        access_token: &str,
        contact_id: &str,
        properties: &ContactProperties,
    ) -> BridgeResult<Contact> {
        let response = self
            .client
            .patch(self.url(&format!("/crm/v3/objects/contacts/{contact_id}")))
            .bearer_auth(access_token)
            .json(&ContactInput {
                properties: properties.clone(),
            })
            .send()
            .await?;
        let response = BridgeError::check_response("update contact", response).await?;
        Ok(response.json::<Contact>().await?)
    }
}
