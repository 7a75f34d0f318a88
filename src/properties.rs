use crate::types::{PropertyDefinition, PropertyGroupDefinition};

pub const PROPERTY_PREFIX: &str = "videoask_";
pub const PROPERTY_GROUP: &str = "videoaskapp";

/// Maps a free-text question title onto a CRM property name.
///
/// The title is lowercased, each whitespace run becomes one `_` and every other
/// character outside `[a-z0-9_]` becomes `_`. The result always carries
/// [`PROPERTY_PREFIX`]; a name that already starts with it is returned as is, so
/// normalizing twice is a no-op.
///
/// As a consequence a title that itself starts with "VideoAsk " shares its
/// property with the same title minus that word: "VideoAsk Rating" and
/// "Rating" both map to `videoask_rating`, and their answers are merged.
pub fn normalize_property_name(title: &str) -> String {
    let mut name = String::with_capacity(PROPERTY_PREFIX.len() + title.len());
    let mut in_whitespace = false;
    for c in title.to_lowercase().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                name.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
        } else {
            name.push('_');
        }
    }

    if name.starts_with(PROPERTY_PREFIX) {
        name
    } else {
        format!("{PROPERTY_PREFIX}{name}")
    }
}

pub fn property_group() -> PropertyGroupDefinition {
    PropertyGroupDefinition {
        name: PROPERTY_GROUP.to_string(),
        display_order: -1,
        label: "Video Ask Properties".to_string(),
    }
}

/// Contact property that stores the answers given to one question.
pub fn answer_property(question_title: &str) -> PropertyDefinition {
    PropertyDefinition {
        name: normalize_property_name(question_title),
        label: format!("VideoAsk {question_title}"),
        property_type: "string".to_string(),
        field_type: "textarea".to_string(),
        group_name: PROPERTY_GROUP.to_string(),
        form_field: true,
    }
}
