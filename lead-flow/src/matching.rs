use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::Result, lead::LeadRecord};

/// Contractor profile handed to the visitor and stored on each match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contractor {
    pub id: String,
    pub name: String,
    pub rating: f32,
    pub specialties: Vec<String>,
    pub response_time: String,
    pub phone: String,
    pub reviews: u32,
    pub years_experience: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
        }
    }
}

/// A contractor proposed for a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorMatch {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub contractor_data: Contractor,
    pub match_score: u8,
    pub status: MatchStatus,
}

/// Source of contractor candidates for a qualified lead.
#[async_trait]
pub trait ContractorMatcher: Send + Sync {
    async fn find_matches(&self, lead: &LeadRecord) -> Result<Vec<ContractorMatch>>;
}

/// Returns the same three sample contractors for every lead, with a match
/// score drawn from 8..=10.
pub struct SampleContractorMatcher {
    contractors: Vec<Contractor>,
}

impl SampleContractorMatcher {
    pub fn new() -> Self {
        Self {
            contractors: sample_contractors(),
        }
    }

    pub fn contractors(&self) -> &[Contractor] {
        &self.contractors
    }
}

impl Default for SampleContractorMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContractorMatcher for SampleContractorMatcher {
    async fn find_matches(&self, lead: &LeadRecord) -> Result<Vec<ContractorMatch>> {
        let mut rng = rand::rng();
        Ok(self
            .contractors
            .iter()
            .map(|contractor| ContractorMatch {
                id: Uuid::new_v4(),
                lead_id: lead.id,
                contractor_data: contractor.clone(),
                match_score: rng.random_range(8..=10),
                status: MatchStatus::Pending,
            })
            .collect())
    }
}

#[allow(clippy::too_many_arguments)]
fn contractor(
    id: &str,
    name: &str,
    rating: f32,
    specialties: &[&str],
    response_time: &str,
    phone: &str,
    reviews: u32,
    years_experience: u32,
) -> Contractor {
    Contractor {
        id: id.to_string(),
        name: name.to_string(),
        rating,
        specialties: specialties.iter().map(|s| s.to_string()).collect(),
        response_time: response_time.to_string(),
        phone: phone.to_string(),
        reviews,
        years_experience,
    }
}

fn sample_contractors() -> Vec<Contractor> {
    vec![
        contractor(
            "CONT_001",
            "Elite Roofing Solutions",
            4.8,
            &["storm damage", "residential", "insurance claims"],
            "2 hours average",
            "(555) 123-4567",
            127,
            15,
        ),
        contractor(
            "CONT_002",
            "ProRoof Masters",
            4.6,
            &["emergency repair", "residential", "commercial"],
            "4 hours average",
            "(555) 234-5678",
            89,
            12,
        ),
        contractor(
            "CONT_003",
            "Reliable Roofing Co",
            4.5,
            &["residential", "insurance work", "repairs"],
            "6 hours average",
            "(555) 345-6789",
            156,
            20,
        ),
    ]
}
