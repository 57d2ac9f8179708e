use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields captured over the course of a chat session.
///
/// Every field is optional: the map only grows as steps capture their
/// answers, and the scorer treats an absent field as contributing nothing.
/// Keys the engine does not know about are kept in `extra` and round-trip
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_severity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_insurance: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_decision_maker: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wants_photo_upload: Option<bool>,
    /// Set by the photo upload path, never by a conversation step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_photos: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_uploaded: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys present, as the client would count them on the wire.
    pub fn captured_field_count(&self) -> usize {
        let strings = [
            &self.damage_type,
            &self.damage_description,
            &self.insurance_response,
            &self.contact_name,
            &self.contact_email,
            &self.contact_phone,
            &self.property_address,
        ];
        let flags = [
            &self.has_insurance,
            &self.is_decision_maker,
            &self.wants_photo_upload,
            &self.has_photos,
            &self.photo_uploaded,
        ];

        strings.iter().filter(|v| v.is_some()).count()
            + flags.iter().filter(|v| v.is_some()).count()
            + usize::from(self.damage_severity.is_some())
            + self.extra.len()
    }

    /// True when name, email and phone were all captured with non-empty text.
    pub fn has_complete_contact(&self) -> bool {
        present(&self.contact_name) && present(&self.contact_email) && present(&self.contact_phone)
    }

    pub fn has_property_address(&self) -> bool {
        present(&self.property_address)
    }

    pub fn mark_photo_uploaded(&mut self) {
        self.has_photos = Some(true);
        self.photo_uploaded = Some(true);
    }
}

/// Empty strings count as absent, matching how the browser client treats them.
pub(crate) fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}
