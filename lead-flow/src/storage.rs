use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    data::ConversationData,
    error::{FlowError, Result},
    lead::LeadRecord,
    matching::ContractorMatch,
    steps::Step,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Completed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Completed => "completed",
        }
    }
}

/// Persisted state of one chat session.
///
/// `current_step` is kept as the raw identifier so a corrupt row surfaces as
/// [`FlowError::UnknownStep`] when the next turn parses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub session_id: String,
    pub current_step: String,
    pub conversation_data: ConversationData,
    pub status: ConversationStatus,
    pub qualification_score: Option<u8>,
    pub lead_data: Option<ConversationData>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConversationRecord {
    /// Fresh session sitting at the greeting.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            current_step: Step::Greeting.as_str().to_string(),
            conversation_data: ConversationData::new(),
            status: ConversationStatus::Active,
            qualification_score: None,
            lead_data: None,
            started_at: now,
            last_activity: now,
            completed_at: None,
        }
    }

    pub fn step(&self) -> Result<Step> {
        self.current_step.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    User,
    Assistant,
}

/// One line of the chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: String,
    /// `user` or `bot`, as the widget labels bubbles.
    pub message_type: String,
    pub message_content: String,
    pub sender: MessageSender,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(conversation_id, content, MessageSender::User)
    }

    pub fn bot(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(conversation_id, content, MessageSender::Assistant)
    }

    fn new(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        sender: MessageSender,
    ) -> Self {
        let message_type = match sender {
            MessageSender::User => "user",
            MessageSender::Assistant => "bot",
        };
        Self {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.into(),
            message_type: message_type.to_string(),
            message_content: content.into(),
            sender,
            created_at: Utc::now(),
        }
    }
}

/// Metadata of a file uploaded against a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadDocument {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub document_type: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// Storage for chat sessions and their transcripts.
#[async_trait]
pub trait ConversationStorage: Send + Sync {
    async fn create_conversation(&self, conversation: ConversationRecord) -> Result<()>;
    async fn get_conversation(&self, session_id: &str) -> Result<Option<ConversationRecord>>;
    /// Replace the stored record; the session must already exist.
    async fn update_conversation(&self, conversation: &ConversationRecord) -> Result<()>;
    async fn append_message(&self, message: ChatMessage) -> Result<()>;
    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>>;
}

/// Storage for leads and everything hanging off them.
#[async_trait]
pub trait LeadStorage: Send + Sync {
    async fn create_lead(&self, lead: &LeadRecord) -> Result<()>;
    async fn find_lead_by_conversation(&self, session_id: &str) -> Result<Option<LeadRecord>>;
    async fn create_contractor_match(&self, contractor_match: &ContractorMatch) -> Result<()>;
    async fn list_contractor_matches(&self, lead_id: Uuid) -> Result<Vec<ContractorMatch>>;
    async fn create_lead_document(&self, document: &LeadDocument) -> Result<()>;
}

/// Opaque binary store that hands back a publicly resolvable URL.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn upload(&self, name: &str, bytes: Vec<u8>, mime_type: &str) -> Result<String>;
}

/// In-memory implementation of every storage trait.
#[derive(Default)]
pub struct InMemoryStorage {
    conversations: Arc<DashMap<String, ConversationRecord>>,
    messages: Arc<DashMap<String, Vec<ChatMessage>>>,
    leads: Arc<DashMap<Uuid, LeadRecord>>,
    matches: Arc<DashMap<Uuid, Vec<ContractorMatch>>>,
    documents: Arc<DashMap<Uuid, Vec<LeadDocument>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents_for(&self, lead_id: Uuid) -> Vec<LeadDocument> {
        self.documents
            .get(&lead_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn lead_count(&self) -> usize {
        self.leads.len()
    }
}

#[async_trait]
impl ConversationStorage for InMemoryStorage {
    async fn create_conversation(&self, conversation: ConversationRecord) -> Result<()> {
        self.conversations
            .insert(conversation.session_id.clone(), conversation);
        Ok(())
    }

    async fn get_conversation(&self, session_id: &str) -> Result<Option<ConversationRecord>> {
        Ok(self
            .conversations
            .get(session_id)
            .map(|entry| entry.clone()))
    }

    async fn update_conversation(&self, conversation: &ConversationRecord) -> Result<()> {
        match self.conversations.get_mut(&conversation.session_id) {
            Some(mut entry) => {
                *entry = conversation.clone();
                Ok(())
            }
            None => Err(FlowError::SessionNotFound(conversation.session_id.clone())),
        }
    }

    async fn append_message(&self, message: ChatMessage) -> Result<()> {
        self.messages
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        Ok(self
            .messages
            .get(session_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl LeadStorage for InMemoryStorage {
    async fn create_lead(&self, lead: &LeadRecord) -> Result<()> {
        self.leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn find_lead_by_conversation(&self, session_id: &str) -> Result<Option<LeadRecord>> {
        Ok(self
            .leads
            .iter()
            .find(|entry| entry.conversation_id == session_id)
            .map(|entry| entry.value().clone()))
    }

    async fn create_contractor_match(&self, contractor_match: &ContractorMatch) -> Result<()> {
        self.matches
            .entry(contractor_match.lead_id)
            .or_default()
            .push(contractor_match.clone());
        Ok(())
    }

    async fn list_contractor_matches(&self, lead_id: Uuid) -> Result<Vec<ContractorMatch>> {
        Ok(self
            .matches
            .get(&lead_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn create_lead_document(&self, document: &LeadDocument) -> Result<()> {
        self.documents
            .entry(document.lead_id)
            .or_default()
            .push(document.clone());
        Ok(())
    }
}

/// Keeps uploads in memory and hands out `memory://` URLs.
#[derive(Default)]
pub struct InMemoryBlobStorage {
    bucket: String,
    objects: Arc<DashMap<String, (Vec<u8>, String)>>,
}

impl InMemoryBlobStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::new(DashMap::new()),
        }
    }

    /// Stored bytes and mime type for `name`.
    pub fn get(&self, name: &str) -> Option<(Vec<u8>, String)> {
        self.objects.get(name).map(|entry| entry.clone())
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn upload(&self, name: &str, bytes: Vec<u8>, mime_type: &str) -> Result<String> {
        self.objects
            .insert(name.to_string(), (bytes, mime_type.to_string()));
        Ok(format!("memory://{}/{}", self.bucket, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conversation_round_trip() {
        let storage = InMemoryStorage::new();
        let mut record = ConversationRecord::new("session1");
        storage.create_conversation(record.clone()).await.unwrap();

        record.current_step = Step::DamageType.as_str().to_string();
        record.conversation_data.damage_type = Some("Leak issues".into());
        storage.update_conversation(&record).await.unwrap();

        let stored = storage.get_conversation("session1").await.unwrap().unwrap();
        assert_eq!(stored.step().unwrap(), Step::DamageType);
        assert_eq!(
            stored.conversation_data.damage_type.as_deref(),
            Some("Leak issues")
        );
    }

    #[tokio::test]
    async fn updating_a_missing_conversation_fails() {
        let storage = InMemoryStorage::new();
        let err = storage
            .update_conversation(&ConversationRecord::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn messages_are_kept_in_order() {
        let storage = InMemoryStorage::new();
        storage
            .append_message(ChatMessage::bot("s", "Hi!"))
            .await
            .unwrap();
        storage
            .append_message(ChatMessage::user("s", "Storm damage"))
            .await
            .unwrap();

        let messages = storage.list_messages("s").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_type, "bot");
        assert_eq!(messages[0].sender, MessageSender::Assistant);
        assert_eq!(messages[1].message_content, "Storm damage");
    }

    #[tokio::test]
    async fn blob_upload_returns_a_url_per_object() {
        let blobs = InMemoryBlobStorage::new("lead-photos");
        let url = blobs
            .upload("s_1_roof.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();

        assert_eq!(url, "memory://lead-photos/s_1_roof.png");
        assert_eq!(
            blobs.get("s_1_roof.png"),
            Some((vec![1, 2, 3], "image/png".to_string()))
        );
    }
}
