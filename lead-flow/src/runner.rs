//! LeadFlowRunner: the orchestration layer that sits between the pure
//! decision functions and the storage collaborators.
//!
//! Every public method follows the same _load → compute → persist_ shape:
//!
//! * [`take_turn`](LeadFlowRunner::take_turn) loads the conversation, runs one
//!   [`ConversationEngine::advance`], stores both sides of the exchange and
//!   only then moves the session to its next step.
//! * [`qualify_lead`](LeadFlowRunner::qualify_lead) scores the captured data,
//!   builds the lead record, stores it and fans out contractor matches.
//! * [`upload_photo`](LeadFlowRunner::upload_photo) pushes a photo to blob
//!   storage and links it to the lead.
//!
//! ## Concurrency
//!
//! The runner holds no per-session state and takes no locks. Two turns racing
//! on the same `session_id` will both read the same step and the later write
//! wins. Callers must serialise turns per session (the browser widget does
//! this by disabling input while a request is in flight).
//!
//! ## Failure semantics
//!
//! Nothing is retried. A turn whose final conversation update fails is
//! reported as failed even though its messages may already be stored; because
//! the step has not moved, sending the same input again is safe.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    data::ConversationData,
    engine::{ConversationEngine, TurnOutcome},
    error::{FlowError, Result},
    lead::{LeadRecord, build_lead},
    matching::{Contractor, ContractorMatcher},
    scoring::{Priority, score},
    storage::{
        BlobStorage, ChatMessage, ConversationRecord, ConversationStatus, ConversationStorage,
        LeadDocument, LeadStorage,
    },
};

/// What the widget shows once a lead has been scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualificationOutcome {
    pub lead_id: Uuid,
    pub qualified: bool,
    pub qualification_score: u8,
    pub priority: Priority,
    pub contractor_matches: Vec<Contractor>,
    pub next_steps: String,
    pub estimated_response: String,
}

impl QualificationOutcome {
    fn new(lead: &LeadRecord, contractor_matches: Vec<Contractor>) -> Self {
        let qualified = lead.is_qualified();
        let (next_steps, estimated_response) = if qualified {
            ("Contractors will contact you within 2-4 hours", "2-4 hours")
        } else {
            (
                "We'll follow up with you when qualified contractors become available",
                "24-48 hours",
            )
        };

        Self {
            lead_id: lead.id,
            qualified,
            qualification_score: lead.qualification_score,
            priority: lead.priority_level,
            contractor_matches,
            next_steps: next_steps.to_string(),
            estimated_response: estimated_response.to_string(),
        }
    }
}

/// Result of a stored photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUpload {
    pub public_url: String,
    pub file_name: String,
    pub file_size: u64,
    pub uploaded: bool,
}

/// A decoded `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn parse(input: &str) -> Result<Self> {
        let rest = input
            .strip_prefix("data:")
            .ok_or_else(|| FlowError::InvalidPayload("imageData is not a data URL".to_string()))?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| {
            FlowError::InvalidPayload("imageData has no payload section".to_string())
        })?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| FlowError::InvalidPayload("imageData must be base64".to_string()))?;

        if mime_type.is_empty() {
            return Err(FlowError::InvalidPayload(
                "imageData has no mime type".to_string(),
            ));
        }

        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| FlowError::InvalidPayload(format!("imageData: {e}")))?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            bytes,
        })
    }
}

/// Orchestrates the chat, qualification and photo operations over the
/// storage collaborators.
#[derive(Clone)]
pub struct LeadFlowRunner {
    engine: ConversationEngine,
    conversations: Arc<dyn ConversationStorage>,
    leads: Arc<dyn LeadStorage>,
    blobs: Arc<dyn BlobStorage>,
    matcher: Arc<dyn ContractorMatcher>,
}

impl LeadFlowRunner {
    pub fn new(
        engine: ConversationEngine,
        conversations: Arc<dyn ConversationStorage>,
        leads: Arc<dyn LeadStorage>,
        blobs: Arc<dyn BlobStorage>,
        matcher: Arc<dyn ContractorMatcher>,
    ) -> Self {
        Self {
            engine,
            conversations,
            leads,
            blobs,
            matcher,
        }
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    /// Create a new session at the greeting step.
    pub async fn start_session(&self) -> Result<ConversationRecord> {
        let record = ConversationRecord::new(Uuid::new_v4().to_string());
        self.conversations.create_conversation(record.clone()).await?;
        info!(session_id = %record.session_id, "Created chat session");
        Ok(record)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<ConversationRecord> {
        self.load_conversation(session_id).await
    }

    pub async fn transcript(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.load_conversation(session_id).await?;
        self.conversations.list_messages(session_id).await
    }

    /// Run exactly one conversation step for `session_id` and persist it.
    pub async fn take_turn(&self, session_id: &str, user_message: &str) -> Result<TurnOutcome> {
        let mut conversation = self.load_conversation(session_id).await?;
        let step = conversation.step()?;

        let outcome = self
            .engine
            .advance(step, user_message, &conversation.conversation_data)?;

        if !user_message.is_empty() {
            self.conversations
                .append_message(ChatMessage::user(session_id, user_message))
                .await?;
        }
        self.conversations
            .append_message(ChatMessage::bot(session_id, outcome.response.clone()))
            .await?;

        conversation.current_step = outcome.next_step.as_str().to_string();
        conversation.conversation_data = outcome.updated_data.clone();
        conversation.last_activity = Utc::now();
        self.conversations.update_conversation(&conversation).await?;

        info!(
            session_id = %session_id,
            step = %step,
            next_step = %outcome.next_step,
            progress = outcome.progress,
            lead_qualified = outcome.lead_qualified,
            "Conversation turn completed"
        );

        Ok(outcome)
    }

    /// Score the session, store the lead and generate contractor matches.
    ///
    /// `lead_data` overrides the stored conversation data when given. A
    /// session that already produced a lead returns that lead unchanged. If an
    /// earlier call stored the lead but failed before the session was marked
    /// completed, the missing matches and the completion are written first.
    pub async fn qualify_lead(
        &self,
        session_id: &str,
        lead_data: Option<ConversationData>,
    ) -> Result<QualificationOutcome> {
        let mut conversation = self.load_conversation(session_id).await?;

        if let Some(existing) = self.leads.find_lead_by_conversation(session_id).await? {
            if conversation.status == ConversationStatus::Completed {
                info!(
                    session_id = %session_id,
                    lead_id = %existing.id,
                    "Lead already qualified, returning stored result"
                );
                let matches = self.leads.list_contractor_matches(existing.id).await?;
                let contractors = matches.into_iter().map(|m| m.contractor_data).collect();
                return Ok(QualificationOutcome::new(&existing, contractors));
            }

            warn!(
                session_id = %session_id,
                lead_id = %existing.id,
                "Resuming interrupted qualification"
            );
            let contractors = self.ensure_matches(&existing).await?;
            let data = lead_data.unwrap_or_else(|| conversation.conversation_data.clone());
            self.complete_conversation(&mut conversation, existing.qualification_score, data)
                .await?;
            return Ok(QualificationOutcome::new(&existing, contractors));
        }

        let data = lead_data.unwrap_or_else(|| conversation.conversation_data.clone());
        let lead_score = score(&data);
        let build = build_lead(session_id, &data, &lead_score);

        self.leads.create_lead(&build.record).await?;

        let contractors = if build.requires_contractor_matching() {
            self.ensure_matches(&build.record).await?
        } else {
            if build.record.is_qualified() {
                warn!(
                    session_id = %session_id,
                    address_unparsed = build.address.unparsed,
                    "Qualified lead has no zip code, skipping contractor matching"
                );
            }
            Vec::new()
        };

        self.complete_conversation(&mut conversation, lead_score.qualification_score, data)
            .await?;

        info!(
            session_id = %session_id,
            lead_id = %build.record.id,
            score = lead_score.qualification_score,
            priority = %lead_score.priority,
            matches = contractors.len(),
            "Lead qualified"
        );

        Ok(QualificationOutcome::new(&build.record, contractors))
    }

    /// Store a match for every candidate the lead does not have yet and
    /// return the full contractor list.
    async fn ensure_matches(&self, lead: &LeadRecord) -> Result<Vec<Contractor>> {
        let mut stored = self.leads.list_contractor_matches(lead.id).await?;
        if lead.requires_contractor_matching() {
            for candidate in self.matcher.find_matches(lead).await? {
                let known = stored
                    .iter()
                    .any(|m| m.contractor_data.id == candidate.contractor_data.id);
                if !known {
                    self.leads.create_contractor_match(&candidate).await?;
                    stored.push(candidate);
                }
            }
        }
        Ok(stored.into_iter().map(|m| m.contractor_data).collect())
    }

    async fn complete_conversation(
        &self,
        conversation: &mut ConversationRecord,
        qualification_score: u8,
        data: ConversationData,
    ) -> Result<()> {
        let now = Utc::now();
        conversation.qualification_score = Some(qualification_score);
        conversation.status = ConversationStatus::Completed;
        conversation.completed_at = Some(now);
        conversation.last_activity = now;
        conversation.lead_data = Some(data);
        self.conversations.update_conversation(conversation).await
    }

    /// Store a photo sent as a data URL and attach it to the session's lead.
    pub async fn upload_photo(
        &self,
        session_id: &str,
        image_data: &str,
        file_name: &str,
    ) -> Result<PhotoUpload> {
        if file_name.trim().is_empty() {
            return Err(FlowError::MissingRequiredField("fileName".to_string()));
        }
        let mut conversation = self.load_conversation(session_id).await?;
        let image = DataUrl::parse(image_data)?;
        let file_size = image.bytes.len() as u64;

        let unique_name = format!(
            "{}_{}_{}",
            session_id,
            Utc::now().timestamp_millis(),
            file_name
        );

        let public_url = self
            .blobs
            .upload(&unique_name, image.bytes, &image.mime_type)
            .await?;

        match self.leads.find_lead_by_conversation(session_id).await? {
            Some(lead) => {
                let document = LeadDocument {
                    id: Uuid::new_v4(),
                    lead_id: lead.id,
                    document_type: "photo".to_string(),
                    file_name: file_name.to_string(),
                    file_path: public_url.clone(),
                    file_size,
                    mime_type: image.mime_type.clone(),
                    created_at: Utc::now(),
                };
                self.leads.create_lead_document(&document).await?;
            }
            None => {
                info!(
                    session_id = %session_id,
                    "No lead yet for session, photo stored without document record"
                );
            }
        }

        conversation.conversation_data.mark_photo_uploaded();
        conversation.last_activity = Utc::now();
        self.conversations.update_conversation(&conversation).await?;

        info!(
            session_id = %session_id,
            file_name = %unique_name,
            file_size,
            mime_type = %image.mime_type,
            "Photo uploaded"
        );

        Ok(PhotoUpload {
            public_url,
            file_name: unique_name,
            file_size,
            uploaded: true,
        })
    }

    async fn load_conversation(&self, session_id: &str) -> Result<ConversationRecord> {
        if session_id.trim().is_empty() {
            return Err(FlowError::MissingRequiredField("sessionId".to_string()));
        }
        self.conversations
            .get_conversation(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))
    }
}
