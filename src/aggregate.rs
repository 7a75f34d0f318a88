use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::{
    crm::{CrmApi, Registration},
    properties::{answer_property, normalize_property_name},
    types::{Answer, ContactProperties, Question},
};

/// Answer values grouped by CRM property name, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerMap {
    entries: Vec<(String, Vec<String>)>,
}

impl AnswerMap {
    pub fn push(&mut self, property: String, value: String) {
        match self.entries.iter_mut().find(|(name, _)| *name == property) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((property, vec![value])),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Each property's values joined with `", "`.
    pub fn to_properties(&self) -> ContactProperties {
        self.entries
            .iter()
            .map(|(name, values)| (name.clone(), values.join(", ")))
            .collect()
    }
}

/// Values an answer contributes: every selected poll option, else its free
/// text. Answers with neither contribute nothing.
fn answer_values(answer: &Answer) -> Vec<String> {
    match answer.poll_options.as_deref() {
        Some(options) if !options.is_empty() => {
            options
                .iter()
                .filter(|option| !option.content.is_empty())
                .map(|option| option.content.clone())
                .collect()
        }
        _ => answer
            .input_text
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(|text| vec![text.to_string()])
            .unwrap_or_default(),
    }
}

/// Folds a form submission into CRM properties, declaring each answered
/// question as a contact property the first time it is seen.
///
/// Answers without a question id or pointing at unknown questions are skipped. Registration failures
/// are logged and never abort the fold.
pub async fn aggregate_answers(
    crm: &dyn CrmApi,
    access_token: &str,
    questions: &[Question],
    answers: &[Answer],
) -> AnswerMap {
    let mut map = AnswerMap::default();
    let mut registered = HashSet::new();

    for answer in answers {
        let Some(question_id) = answer.question_id.as_deref() else {
            debug!("answer without question id");
            continue;
        };
        let Some(question) = questions
            .iter()
            .find(|q| q.question_id.as_deref() == Some(question_id))
        else {
            debug!(question_id, "answer references unknown question");
            continue;
        };

        let values = answer_values(answer);
        if values.is_empty() {
            continue;
        }

        let property = normalize_property_name(&question.title);
        if registered.insert(property.clone()) {
            match crm
                .create_property(access_token, &answer_property(&question.title))
                .await
            {
                Ok(Registration::Created) => info!(property = %property, "contact property created"),
                Ok(Registration::AlreadyExists) => {
                    debug!(property = %property, "contact property already exists")
                }
                Err(err) => warn!(property = %property, error = %err, "contact property creation failed"),
            }
        }

        for value in values {
            map.push(property.clone(), value);
        }
    }

    map
}
