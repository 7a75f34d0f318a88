use tracing::{info, warn};

use crate::{
    crm::CrmApi,
    error::BridgeResult,
    types::ContactProperties,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(String),
    Updated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactUpsertRequest {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub properties: ContactProperties,
}

impl ContactUpsertRequest {
    /// A missing or blank `full_name` leaves both name fields unset; the
    /// contact is still created from its email and answers.
    pub fn new(email: &str, full_name: Option<&str>, properties: ContactProperties) -> Self {
        let (first_name, last_name) = full_name.map(split_full_name).unwrap_or_default();
        Self {
            email: email.trim().to_string(),
            first_name,
            last_name,
            properties,
        }
    }

    /// Body of a contact creation: the identity fields plus every answer property.
    fn creation_properties(&self) -> ContactProperties {
        let mut properties = self.properties.clone();
        properties.insert("email".to_string(), self.email.clone());
        if let Some(first_name) = &self.first_name {
            properties.insert("firstname".to_string(), first_name.clone());
        }
        if let Some(last_name) = &self.last_name {
            properties.insert("lastname".to_string(), last_name.clone());
        }
        properties
    }
}

/// First whitespace token is the first name, the second (if any) the last name.
pub fn split_full_name(full_name: &str) -> (Option<String>, Option<String>) {
    let mut tokens = full_name.split_whitespace();
    let first = tokens.next().map(str::to_string);
    let last = tokens.next().map(str::to_string);
    (first, last)
}

/// Finds the contact by email and updates it, or creates it when no match exists.
///
/// Email equality is the only identity key; with several matches the first
/// one returned by the search is updated.
pub async fn upsert_contact(
    crm: &dyn CrmApi,
    access_token: &str,
    request: &ContactUpsertRequest,
) -> BridgeResult<UpsertOutcome> {
    let matches = crm
        .search_contacts_by_email(access_token, &request.email)
        .await?;

    let Some(existing) = matches.first() else {
        let contact = crm
            .create_contact(access_token, &request.creation_properties())
            .await?;
        info!(
            contact_id = %contact.id,
            properties = request.properties.len(),
            "contact created"
        );
        return Ok(UpsertOutcome::Created(contact.id));
    };

    if matches.len() > 1 {
        warn!(
            email = %request.email,
            matches = matches.len(),
            contact_id = %existing.id,
            "several contacts share this email, updating the first"
        );
    }
    crm.update_contact(access_token, &existing.id, &request.properties)
        .await?;
    info!(
        contact_id = %existing.id,
        properties = request.properties.len(),
        "contact updated"
    );
    Ok(UpsertOutcome::Updated(existing.id.clone()))
}

/// A full name written into both name fields is split back into first and
/// last token. Returns `None` when the fields differ or hold a single word.
pub fn split_duplicated_name(
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Option<(String, String)> {
    let (Some(first_name), Some(last_name)) = (first_name, last_name) else {
        return None;
    };
    if first_name != last_name {
        return None;
    }
    let tokens = first_name.split_whitespace().collect::<Vec<_>>();
    match tokens.as_slice() {
        [first, .., last] => Some((first.to_string(), last.to_string())),
        _ => None,
    }
}

/// Re-reads the contact's names and patches them when both hold the same full name.
pub async fn fix_contact_name(
    crm: &dyn CrmApi,
    access_token: &str,
    contact_id: &str,
) -> BridgeResult<Option<(String, String)>> {
    let contact = crm.get_contact(access_token, contact_id).await?;
    let Some((first_name, last_name)) =
        split_duplicated_name(contact.property("firstname"), contact.property("lastname"))
    else {
        return Ok(None);
    };

    let mut properties = ContactProperties::new();
    properties.insert("firstname".to_string(), first_name.clone());
    properties.insert("lastname".to_string(), last_name.clone());
    crm.update_contact(access_token, contact_id, &properties)
        .await?;
    info!(contact_id, firstname = %first_name, lastname = %last_name, "contact name split");
    Ok(Some((first_name, last_name)))
}
