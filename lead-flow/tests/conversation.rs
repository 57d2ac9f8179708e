use lead_flow::{
    ConversationData, ConversationEngine, Priority, Step, StepTable, build_lead, parse_address,
    score,
};
use std::sync::Arc;

/// Drive the pure engine the way the widget does: greeting first, then one
/// answer per turn, feeding each outcome back in.
fn play(engine: &ConversationEngine, answers: &[&str]) -> (Step, ConversationData) {
    let mut step = Step::Greeting;
    let mut data = ConversationData::new();
    for answer in answers {
        let outcome = engine.advance(step, answer, &data).unwrap();
        step = outcome.next_step;
        data = outcome.updated_data;
    }
    (step, data)
}

#[test]
fn five_answers_after_the_greeting_reach_contact_email() {
    let engine = ConversationEngine::default();
    let (step, data) = play(
        &engine,
        &[
            "",
            "Leak issues",
            "seven-ish",
            "Water in the attic after every storm",
            "Not sure",
            "Sam Rivera",
        ],
    );

    assert_eq!(step, Step::ContactEmail);
    assert_eq!(data.damage_type.as_deref(), Some("Leak issues"));
    assert_eq!(data.damage_severity, Some(5));
    assert_eq!(data.has_insurance, Some(false));
    assert_eq!(data.insurance_response.as_deref(), Some("Not sure"));
    assert_eq!(data.contact_name.as_deref(), Some("Sam Rivera"));
    assert!(data.contact_email.is_none());
}

#[test]
fn a_complete_chat_becomes_a_qualified_lead() {
    let engine = ConversationEngine::default();
    let (step, data) = play(
        &engine,
        &[
            "",
            "Storm damage",
            "7",
            "Hail dented the gutters",
            "Yes, State Farm",
            "Sam Rivera",
            "sam@example.com",
            "555-0199",
            "9 Elm Rd, Dayton, OH 45402",
            "No, I need to check with someone",
            "Yes, I'll upload photos",
        ],
    );
    assert_eq!(step, Step::LeadQualification);

    // base 5, severity 7 (+2), insurance (+2), contact (+1), address (+1)
    let lead_score = score(&data);
    assert_eq!(lead_score.qualification_score, 10);
    assert_eq!(lead_score.priority, Priority::High);

    let build = build_lead("session-42", &data, &lead_score);
    assert!(build.requires_contractor_matching());
    assert_eq!(build.record.city, "Dayton");
    assert_eq!(build.record.state, "OH");
    assert_eq!(build.record.zip_code, "45402");
    assert_eq!(build.record.insurance_company.as_deref(), Some("State Farm"));
    assert!(!build.record.is_decision_maker);
    assert_eq!(build.record.urgency_level, 7);
}

#[test]
fn address_without_commas_is_flagged_unparsed() {
    let parsed = parse_address("123 Main St");
    assert!(parsed.unparsed);
    assert_eq!(parsed.city, "");
    assert_eq!(parsed.state, "123 Main St");
    assert_eq!(parsed.zip_code, "");
}

#[test]
fn reworded_script_loads_from_yaml() {
    let mut yaml = String::new();
    for step in Step::ALL.iter().filter(|s| !s.is_terminal()) {
        yaml.push_str(&format!("{step}:\n  response: \"[{step}] next please\"\n"));
    }
    let table = StepTable::from_yaml_str(&yaml).unwrap();
    let engine = ConversationEngine::new(Arc::new(table));

    let outcome = engine
        .advance(Step::Greeting, "", &ConversationData::new())
        .unwrap();
    assert_eq!(outcome.response, "[greeting] next please");
    assert_eq!(outcome.next_step, Step::DamageType);
    assert!(outcome.options.is_empty());
}
