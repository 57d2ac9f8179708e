use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    address::{ParsedAddress, parse_address},
    data::ConversationData,
    engine::DEFAULT_SEVERITY,
    scoring::{LeadScore, Priority},
};

/// Insurers recognised in the free-text insurance answer, in match order.
pub const KNOWN_INSURERS: [&str; 3] = ["Allstate", "State Farm", "Farmers"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityBucket {
    Severe,
    Moderate,
    Minor,
}

impl SeverityBucket {
    pub fn from_severity(severity: i64) -> Self {
        if severity >= 8 {
            SeverityBucket::Severe
        } else if severity >= 6 {
            SeverityBucket::Moderate
        } else {
            SeverityBucket::Minor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    Qualified,
    Unqualified,
}

/// A qualified-lead row, column names as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: Uuid,
    /// Session id of the chat that produced this lead.
    pub conversation_id: String,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub property_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub property_type: String,
    pub damage_type: String,
    pub damage_severity: SeverityBucket,
    pub damage_description: String,
    pub urgency_level: i64,
    pub has_insurance: bool,
    pub insurance_company: Option<String>,
    pub claim_filed: bool,
    pub is_decision_maker: bool,
    pub qualification_score: u8,
    pub priority_level: Priority,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

impl LeadRecord {
    pub fn is_qualified(&self) -> bool {
        self.status == LeadStatus::Qualified
    }

    /// Contractors are only matched for qualified leads with a usable zip.
    pub fn requires_contractor_matching(&self) -> bool {
        self.is_qualified() && !self.zip_code.is_empty()
    }
}

/// Result of [`build_lead`]: the record plus what the caller must do next.
#[derive(Debug, Clone)]
pub struct LeadBuild {
    pub record: LeadRecord,
    pub address: ParsedAddress,
}

impl LeadBuild {
    pub fn requires_contractor_matching(&self) -> bool {
        self.record.requires_contractor_matching()
    }
}

/// First known insurer mentioned in the answer, ignoring case.
pub fn detect_insurer(response: &str) -> Option<String> {
    let lowered = response.to_lowercase();
    KNOWN_INSURERS
        .iter()
        .find(|name| lowered.contains(&name.to_lowercase()))
        .map(|name| name.to_string())
}

/// Normalise captured conversation data and its score into a lead record.
pub fn build_lead(session_id: &str, data: &ConversationData, score: &LeadScore) -> LeadBuild {
    let property_address = data.property_address.clone().unwrap_or_default();
    let address = parse_address(&property_address);

    let severity = data.damage_severity.unwrap_or(DEFAULT_SEVERITY);

    let record = LeadRecord {
        id: Uuid::new_v4(),
        conversation_id: session_id.to_string(),
        contact_name: data.contact_name.clone().unwrap_or_default(),
        contact_email: data.contact_email.clone().unwrap_or_default(),
        contact_phone: data.contact_phone.clone().unwrap_or_default(),
        property_address,
        city: address.city.clone(),
        state: address.state.clone(),
        zip_code: address.zip_code.clone(),
        property_type: "residential".to_string(),
        damage_type: data
            .damage_type
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "general".to_string()),
        damage_severity: SeverityBucket::from_severity(severity),
        damage_description: data.damage_description.clone().unwrap_or_default(),
        urgency_level: severity.clamp(1, 10),
        has_insurance: data.has_insurance.unwrap_or(false),
        insurance_company: data.insurance_response.as_deref().and_then(detect_insurer),
        claim_filed: false,
        is_decision_maker: data.is_decision_maker.unwrap_or(false),
        qualification_score: score.qualification_score,
        priority_level: score.priority,
        status: if score.qualified {
            LeadStatus::Qualified
        } else {
            LeadStatus::Unqualified
        },
        created_at: Utc::now(),
    };

    LeadBuild { record, address }
}
