use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use crate::error::{FlowError, Result};

/// Identifier of a step in the qualification chat.
///
/// Declaration order is the canonical chain order; transitions only ever move
/// forward along it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Greeting,
    DamageType,
    DamageSeverity,
    DamageDescription,
    InsuranceStatus,
    ContactName,
    ContactEmail,
    ContactPhone,
    PropertyAddress,
    DecisionMaker,
    PhotoUpload,
    LeadQualification,
    Completion,
}

impl Step {
    pub const ALL: [Step; 13] = [
        Step::Greeting,
        Step::DamageType,
        Step::DamageSeverity,
        Step::DamageDescription,
        Step::InsuranceStatus,
        Step::ContactName,
        Step::ContactEmail,
        Step::ContactPhone,
        Step::PropertyAddress,
        Step::DecisionMaker,
        Step::PhotoUpload,
        Step::LeadQualification,
        Step::Completion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Greeting => "greeting",
            Step::DamageType => "damage_type",
            Step::DamageSeverity => "damage_severity",
            Step::DamageDescription => "damage_description",
            Step::InsuranceStatus => "insurance_status",
            Step::ContactName => "contact_name",
            Step::ContactEmail => "contact_email",
            Step::ContactPhone => "contact_phone",
            Step::PropertyAddress => "property_address",
            Step::DecisionMaker => "decision_maker",
            Step::PhotoUpload => "photo_upload",
            Step::LeadQualification => "lead_qualification",
            Step::Completion => "completion",
        }
    }

    /// Successor in the canonical chain; `None` for the terminal step.
    pub fn successor(&self) -> Option<Step> {
        let index = Step::ALL.iter().position(|s| s == self)?;
        Step::ALL.get(index + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Completion)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        Step::ALL
            .iter()
            .find(|step| step.as_str() == s)
            .copied()
            .ok_or_else(|| FlowError::UnknownStep(s.to_string()))
    }
}

/// What the bot says once a step's answer has been captured, and where the
/// chat goes next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Reply template with `{placeholder}` slots.
    pub response: String,
    /// Suggested replies shown as buttons next to the response.
    #[serde(default)]
    pub options: Vec<String>,
    pub next: Step,
}

/// The fixed transition table of the chat.
#[derive(Debug, Clone)]
pub struct StepTable {
    steps: HashMap<Step, StepDefinition>,
}

static STANDARD_TABLE: LazyLock<Arc<StepTable>> = LazyLock::new(|| Arc::new(standard_table()));

impl StepTable {
    /// The built-in roofing inspection script, built once per process.
    pub fn standard() -> Arc<StepTable> {
        STANDARD_TABLE.clone()
    }

    pub fn builder() -> StepTableBuilder {
        StepTableBuilder::new()
    }

    /// Load a reworded script from YAML.
    ///
    /// The document maps step identifiers to `response`, optional `options`
    /// and optional `next` (defaulting to the canonical successor).
    pub fn from_yaml_str(yaml: &str) -> Result<StepTable> {
        let raw: HashMap<Step, YamlStep> = serde_yaml::from_str(yaml)
            .map_err(|e| FlowError::InvalidStepTable(e.to_string()))?;

        let mut builder = StepTableBuilder::new();
        for (step, entry) in raw {
            let next = match entry.next {
                Some(next) => next,
                None => step.successor().ok_or_else(|| {
                    FlowError::InvalidStepTable(format!("step '{step}' has no successor"))
                })?,
            };
            builder = builder.add_step(step, entry.response, entry.options, next);
        }
        builder.build()
    }

    pub fn get(&self, step: Step) -> Option<&StepDefinition> {
        self.steps.get(&step)
    }

    /// Declared successor of `step`, if the table defines it.
    pub fn next_of(&self, step: Step) -> Option<Step> {
        self.steps.get(&step).map(|def| def.next)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Deserialize)]
struct YamlStep {
    response: String,
    #[serde(default)]
    options: Vec<String>,
    next: Option<Step>,
}

/// Builder that validates the table before handing it out.
pub struct StepTableBuilder {
    steps: HashMap<Step, StepDefinition>,
}

impl StepTableBuilder {
    pub fn new() -> Self {
        Self {
            steps: HashMap::new(),
        }
    }

    pub fn add_step<S: Into<String>>(
        mut self,
        step: Step,
        response: impl Into<String>,
        options: impl IntoIterator<Item = S>,
        next: Step,
    ) -> Self {
        self.steps.insert(
            step,
            StepDefinition {
                response: response.into(),
                options: options.into_iter().map(Into::into).collect(),
                next,
            },
        );
        self
    }

    /// Every non-terminal step needs a definition, the terminal step must not
    /// have one, and every transition goes to the canonical successor.
    pub fn build(self) -> Result<StepTable> {
        for step in Step::ALL {
            match self.steps.get(&step) {
                None if !step.is_terminal() => {
                    return Err(FlowError::InvalidStepTable(format!(
                        "missing definition for step '{step}'"
                    )));
                }
                Some(_) if step.is_terminal() => {
                    return Err(FlowError::InvalidStepTable(format!(
                        "terminal step '{step}' cannot define a reply"
                    )));
                }
                Some(def) if Some(def.next) != step.successor() => {
                    return Err(FlowError::InvalidStepTable(format!(
                        "step '{step}' must lead to its successor, not '{}'",
                        def.next
                    )));
                }
                _ => {}
            }
        }

        Ok(StepTable { steps: self.steps })
    }
}

impl Default for StepTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

const NO_OPTIONS: [&str; 0] = [];

fn standard_table() -> StepTable {
    let table = StepTable::builder()
        .add_step(
            Step::Greeting,
            "Hi! I'm here to help you get your roof inspected quickly. What type of roof damage are you experiencing?",
            ["Storm damage", "Leak issues", "Aging/wear", "Other damage"],
            Step::DamageType,
        )
        .add_step(
            Step::DamageType,
            "I understand you're dealing with {damage_type}. How severe would you rate the damage on a scale of 1-10?",
            NO_OPTIONS,
            Step::DamageSeverity,
        )
        .add_step(
            Step::DamageSeverity,
            "Thanks for that info. Can you describe the damage in more detail? This helps us match you with the right contractor.",
            NO_OPTIONS,
            Step::DamageDescription,
        )
        .add_step(
            Step::DamageDescription,
            "Perfect! Now, do you have homeowner's insurance that might cover this damage?",
            ["Yes, I have insurance", "No insurance", "Not sure"],
            Step::InsuranceStatus,
        )
        .add_step(
            Step::InsuranceStatus,
            "Great! Let me get your contact information so we can connect you with qualified contractors in your area. What's your full name?",
            NO_OPTIONS,
            Step::ContactName,
        )
        .add_step(
            Step::ContactName,
            "Nice to meet you, {contact_name}! What's the best email address to reach you?",
            NO_OPTIONS,
            Step::ContactEmail,
        )
        .add_step(
            Step::ContactEmail,
            "And what's your phone number? Our contractors prefer to call to schedule inspections.",
            NO_OPTIONS,
            Step::ContactPhone,
        )
        .add_step(
            Step::ContactPhone,
            "Perfect! What's the address of the property that needs the roof inspection?",
            NO_OPTIONS,
            Step::PropertyAddress,
        )
        .add_step(
            Step::PropertyAddress,
            "Excellent! Are you the homeowner or decision-maker for this property?",
            [
                "Yes, I'm the homeowner",
                "Yes, I can make decisions",
                "No, I need to check with someone",
            ],
            Step::DecisionMaker,
        )
        .add_step(
            Step::DecisionMaker,
            "Perfect! Would you like to upload any photos of the damage? This helps contractors provide better estimates.",
            ["Yes, I'll upload photos", "No photos right now"],
            Step::PhotoUpload,
        )
        .add_step(
            Step::PhotoUpload,
            "Excellent! I'm now processing your information and matching you with qualified contractors in your area. This will just take a moment...",
            NO_OPTIONS,
            Step::LeadQualification,
        )
        .add_step(
            Step::LeadQualification,
            "🎉 Great news! I've found {contractor_count} highly-rated contractors in your area. You should expect to hear from them within 2-4 hours. We guarantee a 90% appointment setup rate!",
            NO_OPTIONS,
            Step::Completion,
        )
        .build();

    table.expect("built-in step table must be valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_is_a_linear_chain() {
        let table = StepTable::standard();
        assert_eq!(table.len(), 12);

        for step in Step::ALL.iter().filter(|s| !s.is_terminal()) {
            assert_eq!(table.next_of(*step), step.successor(), "step {step}");
        }
        assert!(table.get(Step::Completion).is_none());
    }

    #[test]
    fn step_identifiers_round_trip_through_strings() {
        for step in Step::ALL {
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
        }
        assert!(matches!(
            "roof_color".parse::<Step>(),
            Err(FlowError::UnknownStep(s)) if s == "roof_color"
        ));
    }

    #[test]
    fn builder_rejects_missing_steps() {
        let err = StepTable::builder()
            .add_step(Step::Greeting, "hi", NO_OPTIONS, Step::DamageType)
            .build()
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidStepTable(_)));
    }

    #[test]
    fn yaml_table_defaults_next_to_canonical_successor() {
        let mut yaml = String::new();
        for step in Step::ALL
            .iter()
            .filter(|s| !s.is_terminal() && **s != Step::Greeting)
        {
            yaml.push_str(&format!("{step}:\n  response: \"Reply after {step}\"\n"));
        }
        yaml.push_str("greeting:\n  response: \"Howdy! What happened to your roof?\"\n  options: [\"Hail\", \"Wind\"]\n");

        let table = StepTable::from_yaml_str(&yaml).unwrap();
        let greeting = table.get(Step::Greeting).unwrap();
        assert_eq!(greeting.response, "Howdy! What happened to your roof?");
        assert_eq!(greeting.options, vec!["Hail", "Wind"]);
        assert_eq!(greeting.next, Step::DamageType);
    }

    #[test]
    fn yaml_table_rejects_backward_transitions() {
        let mut yaml = String::new();
        for step in Step::ALL
            .iter()
            .filter(|s| !s.is_terminal() && **s != Step::ContactPhone)
        {
            yaml.push_str(&format!("{step}:\n  response: \"r\"\n"));
        }
        yaml.push_str("contact_phone:\n  response: \"r\"\n  next: greeting\n");

        assert!(matches!(
            StepTable::from_yaml_str(&yaml),
            Err(FlowError::InvalidStepTable(_))
        ));
    }

    #[test]
    fn yaml_table_rejects_skipped_steps() {
        let mut yaml = String::new();
        for step in Step::ALL
            .iter()
            .filter(|s| !s.is_terminal() && **s != Step::PhotoUpload)
        {
            yaml.push_str(&format!("{step}:\n  response: \"r\"\n"));
        }
        yaml.push_str("photo_upload:\n  response: \"r\"\n  next: completion\n");

        assert!(matches!(
            StepTable::from_yaml_str(&yaml),
            Err(FlowError::InvalidStepTable(msg)) if msg.contains("photo_upload")
        ));
    }
}
