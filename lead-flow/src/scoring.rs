use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::ConversationData;

const BASE_SCORE: i32 = 5;
const MIN_SCORE: i32 = 1;
const MAX_SCORE: i32 = 10;
const QUALIFIED_THRESHOLD: u8 = 6;
const HIGH_PRIORITY_THRESHOLD: u8 = 8;

/// Follow-up urgency for a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scoring a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadScore {
    /// Always within 1..=10.
    pub qualification_score: u8,
    pub qualified: bool,
    pub priority: Priority,
}

impl LeadScore {
    pub fn from_points(points: i32) -> Self {
        let qualification_score = points.clamp(MIN_SCORE, MAX_SCORE) as u8;
        let priority = if qualification_score >= HIGH_PRIORITY_THRESHOLD {
            Priority::High
        } else if qualification_score >= QUALIFIED_THRESHOLD {
            Priority::Medium
        } else {
            Priority::Low
        };

        Self {
            qualification_score,
            qualified: qualification_score >= QUALIFIED_THRESHOLD,
            priority,
        }
    }
}

/// Points for the visitor's severity answer; bands are checked highest first.
fn severity_points(severity: Option<i64>) -> i32 {
    match severity {
        Some(s) if s >= 8 => 3,
        Some(s) if s >= 6 => 2,
        Some(s) if s >= 4 => 1,
        _ => 0,
    }
}

/// Additive point system on top of a base of 5, clamped to 1..=10.
///
/// Absent fields contribute nothing, so any partially filled conversation can
/// be scored.
pub fn score(data: &ConversationData) -> LeadScore {
    let mut points = BASE_SCORE;

    points += severity_points(data.damage_severity);

    if data.has_insurance == Some(true) {
        points += 2;
    }
    if data.is_decision_maker == Some(true) {
        points += 2;
    }
    if data.has_photos == Some(true) {
        points += 1;
    }
    if data.has_complete_contact() {
        points += 1;
    }
    if data.has_property_address() {
        points += 1;
    }

    LeadScore::from_points(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fully_qualified() -> ConversationData {
        ConversationData {
            damage_severity: Some(8),
            has_insurance: Some(true),
            is_decision_maker: Some(true),
            has_photos: Some(true),
            contact_name: Some("Jane Doe".into()),
            contact_email: Some("jane@example.com".into()),
            contact_phone: Some("555-0100".into()),
            property_address: Some("123 Main St, Springfield, IL 62704".into()),
            ..Default::default()
        }
    }

    #[test]
    fn every_signal_caps_at_ten() {
        let result = score(&fully_qualified());
        assert_eq!(result.qualification_score, 10);
        assert!(result.qualified);
        assert_eq!(result.priority, Priority::High);
    }

    #[test]
    fn empty_data_scores_the_base_only() {
        let result = score(&ConversationData::new());
        assert_eq!(result.qualification_score, 5);
        assert!(!result.qualified);
        assert_eq!(result.priority, Priority::Low);
    }

    #[test]
    fn severity_bands_do_not_stack() {
        let with_severity = |s| ConversationData {
            damage_severity: Some(s),
            ..Default::default()
        };

        assert_eq!(score(&with_severity(10)).qualification_score, 8);
        assert_eq!(score(&with_severity(8)).qualification_score, 8);
        assert_eq!(score(&with_severity(7)).qualification_score, 7);
        assert_eq!(score(&with_severity(6)).qualification_score, 7);
        assert_eq!(score(&with_severity(5)).qualification_score, 6);
        assert_eq!(score(&with_severity(4)).qualification_score, 6);
        assert_eq!(score(&with_severity(3)).qualification_score, 5);
        assert_eq!(score(&with_severity(-2)).qualification_score, 5);
    }

    #[test]
    fn contact_bonus_needs_all_three_fields() {
        let mut data = ConversationData {
            contact_name: Some("Jane Doe".into()),
            contact_email: Some("jane@example.com".into()),
            ..Default::default()
        };
        assert_eq!(score(&data).qualification_score, 5);

        data.contact_phone = Some("555-0100".into());
        assert_eq!(score(&data).qualification_score, 6);
    }

    #[test]
    fn medium_priority_band() {
        let data = ConversationData {
            has_insurance: Some(true),
            ..Default::default()
        };
        let result = score(&data);
        assert_eq!(result.qualification_score, 7);
        assert!(result.qualified);
        assert_eq!(result.priority, Priority::Medium);
    }

    #[test]
    fn false_flags_add_nothing() {
        let data = ConversationData {
            has_insurance: Some(false),
            is_decision_maker: Some(false),
            has_photos: Some(false),
            ..Default::default()
        };
        assert_eq!(score(&data).qualification_score, 5);
    }

    #[test]
    fn scoring_is_deterministic() {
        let data = fully_qualified();
        assert_eq!(score(&data), score(&data));
    }

    #[test]
    fn points_are_clamped_into_range() {
        assert_eq!(LeadScore::from_points(-4).qualification_score, 1);
        assert_eq!(LeadScore::from_points(15).qualification_score, 10);
    }
}
