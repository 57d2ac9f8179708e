//! Storage backed by a hosted backend-as-a-service: a PostgREST-style table
//! API under `/rest/v1` and an object store under `/storage/v1`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    error::{FlowError, Result},
    lead::LeadRecord,
    matching::ContractorMatch,
    storage::{
        BlobStorage, ChatMessage, ConversationRecord, ConversationStorage, LeadDocument,
        LeadStorage,
    },
};

const CONVERSATIONS: &str = "chat_conversations";
const MESSAGES: &str = "chat_messages";
const LEADS: &str = "qualified_leads";
const MATCHES: &str = "contractor_matches";
const DOCUMENTS: &str = "lead_documents";

/// Talks to the hosted database and object store with the service role key.
#[derive(Clone)]
pub struct RestStorage {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl RestStorage {
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self::with_client(Client::new(), base_url, service_key, bucket)
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            bucket: bucket.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Public URL of an object in the photo bucket.
    pub fn public_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(name)
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> Result<()> {
        debug!(table, "Inserting row");
        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .json(row)
            .send()
            .await
            .map_err(|e| persistence_error(table, e))?;
        check_status(table, response).await?;
        Ok(())
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let response = self
            .authorized(self.client.get(self.table_url(table)))
            .query(filters)
            .send()
            .await
            .map_err(|e| persistence_error(table, e))?;
        let response = check_status(table, response).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| persistence_error(table, e))
    }
}

fn persistence_error(table: &str, err: reqwest::Error) -> FlowError {
    error!(table, error = %err, "Persistence request failed");
    FlowError::UpstreamPersistenceFailure(format!("{table}: {err}"))
}

async fn check_status(table: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(table, status = %status, body = %body, "Persistence request rejected");
    Err(FlowError::UpstreamPersistenceFailure(format!(
        "{table}: {status} {body}"
    )))
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl ConversationStorage for RestStorage {
    async fn create_conversation(&self, conversation: ConversationRecord) -> Result<()> {
        self.insert(CONVERSATIONS, &conversation).await
    }

    async fn get_conversation(&self, session_id: &str) -> Result<Option<ConversationRecord>> {
        let rows: Vec<ConversationRecord> = self
            .select(CONVERSATIONS, &[("session_id", eq(session_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_conversation(&self, conversation: &ConversationRecord) -> Result<()> {
        let response = self
            .authorized(self.client.patch(self.table_url(CONVERSATIONS)))
            .query(&[("session_id", eq(&conversation.session_id))])
            .header("Prefer", "return=representation")
            .json(conversation)
            .send()
            .await
            .map_err(|e| persistence_error(CONVERSATIONS, e))?;
        let updated: Vec<serde_json::Value> = check_status(CONVERSATIONS, response)
            .await?
            .json()
            .await
            .map_err(|e| persistence_error(CONVERSATIONS, e))?;

        if updated.is_empty() {
            return Err(FlowError::SessionNotFound(conversation.session_id.clone()));
        }
        Ok(())
    }

    async fn append_message(&self, message: ChatMessage) -> Result<()> {
        self.insert(MESSAGES, &message).await
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.select(
            MESSAGES,
            &[
                ("conversation_id", eq(session_id)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }
}

#[async_trait]
impl LeadStorage for RestStorage {
    async fn create_lead(&self, lead: &LeadRecord) -> Result<()> {
        self.insert(LEADS, lead).await
    }

    async fn find_lead_by_conversation(&self, session_id: &str) -> Result<Option<LeadRecord>> {
        let rows: Vec<LeadRecord> = self
            .select(
                LEADS,
                &[
                    ("conversation_id", eq(session_id)),
                    ("order", "created_at.asc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_contractor_match(&self, contractor_match: &ContractorMatch) -> Result<()> {
        self.insert(MATCHES, contractor_match).await
    }

    async fn list_contractor_matches(&self, lead_id: Uuid) -> Result<Vec<ContractorMatch>> {
        self.select(MATCHES, &[("lead_id", eq(lead_id))]).await
    }

    async fn create_lead_document(&self, document: &LeadDocument) -> Result<()> {
        self.insert(DOCUMENTS, document).await
    }
}

#[async_trait]
impl BlobStorage for RestStorage {
    async fn upload(&self, name: &str, bytes: Vec<u8>, mime_type: &str) -> Result<String> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(name)
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.service_key)
            .header("Content-Type", mime_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| FlowError::UpstreamStorageFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Upload rejected");
            return Err(FlowError::UpstreamStorageFailure(format!(
                "Upload failed: {status} {body}"
            )));
        }

        Ok(self.public_url(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_a_trimmed_base() {
        let storage = RestStorage::new("https://example.supabase.co/", "key", "lead-photos");
        assert_eq!(
            storage.table_url(LEADS),
            "https://example.supabase.co/rest/v1/qualified_leads"
        );
        assert_eq!(
            storage.public_url("s_1_my roof.jpg"),
            "https://example.supabase.co/storage/v1/object/public/lead-photos/s_1_my%20roof.jpg"
        );
    }
}
