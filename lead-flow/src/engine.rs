//! The scripted qualification chat.
//!
//! [`ConversationEngine::advance`] is a pure function of the current step, the
//! visitor's message and the data captured so far. It never touches storage;
//! persisting the outcome is the job of [`crate::runner::LeadFlowRunner`].

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::{
    data::ConversationData,
    error::{FlowError, Result},
    steps::{Step, StepTable},
};

/// Number of contractors promised in the closing message.
pub const CONTRACTOR_COUNT: u32 = 3;

/// Field count at which the progress bar reads 100%.
const PROGRESS_FIELD_TARGET: f64 = 10.0;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid"));

/// Everything the chat widget needs after one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub response: String,
    pub options: Vec<String>,
    pub next_step: Step,
    #[serde(rename = "conversationData")]
    pub updated_data: ConversationData,
    /// Only true on the turn where the visitor agreed to upload photos.
    pub show_photo_upload: bool,
    /// Raised when `photo_upload` completes, before any score exists.
    pub lead_qualified: bool,
    pub progress: u8,
}

/// Applies capture rules and renders replies from a [`StepTable`].
#[derive(Debug, Clone)]
pub struct ConversationEngine {
    table: Arc<StepTable>,
}

impl ConversationEngine {
    pub fn new(table: Arc<StepTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &StepTable {
        &self.table
    }

    /// Same as [`advance`](Self::advance) for a step identifier coming off the wire.
    pub fn advance_from(
        &self,
        current_step: &str,
        user_message: &str,
        data: &ConversationData,
    ) -> Result<TurnOutcome> {
        let step: Step = current_step.parse()?;
        self.advance(step, user_message, data)
    }

    /// Capture the answer for `current_step`, then move to its successor.
    pub fn advance(
        &self,
        current_step: Step,
        user_message: &str,
        data: &ConversationData,
    ) -> Result<TurnOutcome> {
        if current_step.is_terminal() {
            return Err(FlowError::ConversationCompleted(current_step.to_string()));
        }

        let definition = self
            .table
            .get(current_step)
            .ok_or_else(|| FlowError::UnknownStep(current_step.to_string()))?;

        if current_step != Step::Greeting && user_message.trim().is_empty() {
            return Err(FlowError::MissingRequiredField("userMessage".to_string()));
        }

        let mut updated_data = data.clone();
        let show_photo_upload = capture(current_step, user_message, &mut updated_data);

        let response = render_template(&definition.response, &updated_data);
        let progress = progress_for(&updated_data);

        debug!(
            step = %current_step,
            next_step = %definition.next,
            progress,
            "Advanced conversation"
        );

        Ok(TurnOutcome {
            response,
            options: definition.options.clone(),
            next_step: definition.next,
            updated_data,
            show_photo_upload,
            lead_qualified: current_step == Step::PhotoUpload,
            progress,
        })
    }
}

impl Default for ConversationEngine {
    fn default() -> Self {
        Self::new(StepTable::standard())
    }
}

/// Store the answer for `step` in `data`. Returns whether the photo upload
/// widget should open.
fn capture(step: Step, message: &str, data: &mut ConversationData) -> bool {
    match step {
        Step::DamageType => data.damage_type = Some(message.to_string()),
        Step::DamageSeverity => data.damage_severity = Some(parse_severity(message)),
        Step::DamageDescription => data.damage_description = Some(message.to_string()),
        Step::InsuranceStatus => {
            data.has_insurance = Some(is_affirmative(message));
            data.insurance_response = Some(message.to_string());
        }
        Step::ContactName => data.contact_name = Some(message.to_string()),
        Step::ContactEmail => data.contact_email = Some(message.to_string()),
        Step::ContactPhone => data.contact_phone = Some(message.to_string()),
        Step::PropertyAddress => data.property_address = Some(message.to_string()),
        Step::DecisionMaker => data.is_decision_maker = Some(is_affirmative(message)),
        Step::PhotoUpload => {
            let wants_photos = is_affirmative(message);
            data.wants_photo_upload = Some(wants_photos);
            return wants_photos;
        }
        Step::Greeting | Step::LeadQualification | Step::Completion => {}
    }
    false
}

/// Default severity when the visitor's answer has no usable number.
pub const DEFAULT_SEVERITY: i64 = 5;

/// Leading integer of `input`, after optional whitespace and sign.
///
/// No digits, overflow and zero all fall back to [`DEFAULT_SEVERITY`]; the
/// browser widget has always treated a zero answer as "no answer".
pub fn parse_severity(input: &str) -> i64 {
    let trimmed = input.trim_start();
    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };

    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());

    match rest[..digits_end].parse::<i64>() {
        Ok(0) | Err(_) => DEFAULT_SEVERITY,
        Ok(value) => sign * value,
    }
}

/// Case-insensitive "yes" anywhere in the text.
///
/// Deliberately lenient: "yes, but actually no" counts as yes.
pub fn is_affirmative(input: &str) -> bool {
    input.to_lowercase().contains("yes")
}

/// Fill `{damage_type}`, `{contact_name}` and `{contractor_count}`; any other
/// placeholder renders empty.
pub fn render_template(template: &str, data: &ConversationData) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "damage_type" => data
                .damage_type
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "damage".to_string()),
            "contact_name" => data.contact_name.clone().unwrap_or_default(),
            "contractor_count" => CONTRACTOR_COUNT.to_string(),
            _ => String::new(),
        })
        .into_owned()
}

fn progress_for(data: &ConversationData) -> u8 {
    let ratio = data.captured_field_count() as f64 / PROGRESS_FIELD_TARGET;
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ConversationEngine {
        ConversationEngine::default()
    }

    fn answer_for(step: Step) -> &'static str {
        match step {
            Step::Greeting => "",
            Step::DamageSeverity => "6",
            Step::InsuranceStatus | Step::DecisionMaker | Step::PhotoUpload => "Yes",
            _ => "some answer",
        }
    }

    #[test]
    fn every_step_moves_to_its_declared_successor() {
        let engine = engine();
        let data = ConversationData::new();

        for step in Step::ALL.iter().filter(|s| !s.is_terminal()) {
            let outcome = engine.advance(*step, answer_for(*step), &data).unwrap();
            assert_eq!(Some(outcome.next_step), engine.table().next_of(*step));
        }
    }

    #[test]
    fn greeting_returns_the_opening_question_without_capturing() {
        let outcome = engine()
            .advance(Step::Greeting, "", &ConversationData::new())
            .unwrap();

        assert!(outcome.response.starts_with("Hi! I'm here to help"));
        assert_eq!(outcome.options.len(), 4);
        assert_eq!(outcome.next_step, Step::DamageType);
        assert_eq!(outcome.updated_data, ConversationData::new());
        assert_eq!(outcome.progress, 0);
    }

    #[test]
    fn greeting_ignores_any_message() {
        let outcome = engine()
            .advance(Step::Greeting, "hello there", &ConversationData::new())
            .unwrap();
        assert_eq!(outcome.updated_data.captured_field_count(), 0);
    }

    #[test]
    fn severity_is_parsed_from_the_leading_integer() {
        let engine = engine();
        let data = ConversationData::new();

        let seven = engine.advance(Step::DamageSeverity, "7", &data).unwrap();
        assert_eq!(seven.updated_data.damage_severity, Some(7));

        let fallback = engine
            .advance(Step::DamageSeverity, "not a number", &data)
            .unwrap();
        assert_eq!(fallback.updated_data.damage_severity, Some(5));
    }

    #[test]
    fn parse_severity_edge_cases() {
        assert_eq!(parse_severity("  9 out of 10"), 9);
        assert_eq!(parse_severity("7.5"), 7);
        assert_eq!(parse_severity("-3"), -3);
        assert_eq!(parse_severity("0"), DEFAULT_SEVERITY);
        assert_eq!(parse_severity("about 8"), DEFAULT_SEVERITY);
        assert_eq!(parse_severity("99999999999999999999999"), DEFAULT_SEVERITY);
    }

    #[test]
    fn insurance_answer_sets_flag_and_keeps_raw_text() {
        let outcome = engine()
            .advance(
                Step::InsuranceStatus,
                "YES, State Farm",
                &ConversationData::new(),
            )
            .unwrap();

        assert_eq!(outcome.updated_data.has_insurance, Some(true));
        assert_eq!(
            outcome.updated_data.insurance_response.as_deref(),
            Some("YES, State Farm")
        );
    }

    #[test]
    fn affirmative_matching_is_a_plain_substring_check() {
        assert!(is_affirmative("Yes, I'm the homeowner"));
        assert!(is_affirmative("yes, but actually no"));
        assert!(is_affirmative("eyeS"));
        assert!(!is_affirmative("No, I need to check with someone"));
        assert!(!is_affirmative("Not sure"));
    }

    #[test]
    fn photo_upload_opens_widget_only_when_affirmative() {
        let engine = engine();
        let data = ConversationData::new();

        let yes = engine
            .advance(Step::PhotoUpload, "Yes, I'll upload photos", &data)
            .unwrap();
        assert!(yes.show_photo_upload);
        assert!(yes.lead_qualified);
        assert_eq!(yes.updated_data.wants_photo_upload, Some(true));

        let no = engine
            .advance(Step::PhotoUpload, "No photos right now", &data)
            .unwrap();
        assert!(!no.show_photo_upload);
        assert!(no.lead_qualified);
        assert_eq!(no.updated_data.wants_photo_upload, Some(false));
    }

    #[test]
    fn lead_qualified_is_only_raised_by_photo_upload() {
        let engine = engine();
        let data = ConversationData::new();
        for step in Step::ALL
            .iter()
            .filter(|s| !s.is_terminal() && **s != Step::PhotoUpload)
        {
            let outcome = engine.advance(*step, answer_for(*step), &data).unwrap();
            assert!(!outcome.lead_qualified, "step {step}");
            assert!(!outcome.show_photo_upload, "step {step}");
        }
    }

    #[test]
    fn empty_message_is_rejected_after_greeting() {
        let err = engine()
            .advance(Step::ContactName, "   ", &ConversationData::new())
            .unwrap_err();
        assert!(matches!(err, FlowError::MissingRequiredField(f) if f == "userMessage"));
    }

    #[test]
    fn completion_is_read_only() {
        let err = engine()
            .advance(Step::Completion, "anything else?", &ConversationData::new())
            .unwrap_err();
        assert!(matches!(err, FlowError::ConversationCompleted(_)));
    }

    #[test]
    fn unknown_step_identifier_is_rejected() {
        let err = engine()
            .advance_from("roof_color", "red", &ConversationData::new())
            .unwrap_err();
        assert!(matches!(err, FlowError::UnknownStep(s) if s == "roof_color"));
    }

    #[test]
    fn templates_fill_known_placeholders_and_blank_the_rest() {
        let mut data = ConversationData::new();
        assert_eq!(
            render_template("Dealing with {damage_type} for {contact_name}.", &data),
            "Dealing with damage for ."
        );

        data.damage_type = Some("hail".to_string());
        data.contact_name = Some("Jane".to_string());
        assert_eq!(
            render_template(
                "{contact_name}: {damage_type}, {contractor_count} pros, {unknown}!",
                &data
            ),
            "Jane: hail, 3 pros, !"
        );
    }

    #[test]
    fn damage_type_reply_mentions_the_captured_type() {
        let outcome = engine()
            .advance(Step::DamageType, "Storm damage", &ConversationData::new())
            .unwrap();
        assert_eq!(
            outcome.response,
            "I understand you're dealing with Storm damage. How severe would you rate the damage on a scale of 1-10?"
        );
    }

    #[test]
    fn progress_counts_captured_fields_and_is_clamped() {
        let mut data = ConversationData::new();
        data.damage_type = Some("Leak issues".to_string());
        data.damage_severity = Some(4);

        let outcome = engine()
            .advance(Step::DamageDescription, "Dripping in the attic", &data)
            .unwrap();
        assert_eq!(outcome.progress, 30);

        let full = ConversationData {
            damage_type: Some("a".into()),
            damage_severity: Some(8),
            damage_description: Some("b".into()),
            insurance_response: Some("yes".into()),
            has_insurance: Some(true),
            contact_name: Some("c".into()),
            contact_email: Some("d".into()),
            contact_phone: Some("e".into()),
            property_address: Some("f".into()),
            is_decision_maker: Some(true),
            ..Default::default()
        };
        let outcome = engine()
            .advance(Step::PhotoUpload, "yes", &full)
            .unwrap();
        assert_eq!(outcome.updated_data.captured_field_count(), 11);
        assert_eq!(outcome.progress, 100);
    }

    #[test]
    fn existing_fields_are_kept_when_a_step_captures() {
        let mut data = ConversationData::new();
        data.damage_type = Some("Aging/wear".to_string());
        data.extra
            .insert("campaign".to_string(), serde_json::json!("spring"));

        let outcome = engine()
            .advance(Step::DamageSeverity, "4", &data)
            .unwrap();
        assert_eq!(outcome.updated_data.damage_type.as_deref(), Some("Aging/wear"));
        assert_eq!(outcome.updated_data.damage_severity, Some(4));
        assert!(outcome.updated_data.extra.contains_key("campaign"));
    }
}
