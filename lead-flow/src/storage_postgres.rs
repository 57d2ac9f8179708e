use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow, types::Json};
use tracing::info;
use uuid::Uuid;

use crate::{
    data::ConversationData,
    error::{FlowError, Result},
    lead::LeadRecord,
    matching::ContractorMatch,
    storage::{
        ChatMessage, ConversationRecord, ConversationStatus, ConversationStorage, LeadDocument,
        LeadStorage, MessageSender,
    },
};

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS chat_conversations (
        session_id TEXT PRIMARY KEY,
        current_step TEXT NOT NULL,
        conversation_data JSONB NOT NULL,
        status TEXT NOT NULL,
        qualification_score SMALLINT,
        lead_data JSONB,
        started_at TIMESTAMPTZ NOT NULL,
        last_activity TIMESTAMPTZ NOT NULL,
        completed_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id UUID PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        message_type TEXT NOT NULL,
        message_content TEXT NOT NULL,
        sender TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qualified_leads (
        id UUID PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        zip_code TEXT NOT NULL,
        qualification_score SMALLINT NOT NULL,
        status TEXT NOT NULL,
        record JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contractor_matches (
        id UUID PRIMARY KEY,
        lead_id UUID NOT NULL REFERENCES qualified_leads(id),
        match_score SMALLINT NOT NULL,
        status TEXT NOT NULL,
        record JSONB NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lead_documents (
        id UUID PRIMARY KEY,
        lead_id UUID NOT NULL REFERENCES qualified_leads(id),
        document_type TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_size BIGINT NOT NULL,
        mime_type TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// PostgreSQL-backed conversation and lead storage.
///
/// Leads and matches keep their full record in a JSONB column next to the
/// columns used for lookups.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect and create the tables if they do not exist yet.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("PostgreSQL storage ready");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn conversation_from_row(row: &PgRow) -> Result<ConversationRecord> {
    let status: String = row.try_get("status")?;
    let status = match status.as_str() {
        "completed" => ConversationStatus::Completed,
        _ => ConversationStatus::Active,
    };
    let score: Option<i16> = row.try_get("qualification_score")?;
    let lead_data: Option<Json<ConversationData>> = row.try_get("lead_data")?;

    Ok(ConversationRecord {
        session_id: row.try_get("session_id")?,
        current_step: row.try_get("current_step")?,
        conversation_data: row
            .try_get::<Json<ConversationData>, _>("conversation_data")?
            .0,
        status,
        qualification_score: score.map(|s| s.clamp(0, u8::MAX as i16) as u8),
        lead_data: lead_data.map(|json| json.0),
        started_at: row.try_get("started_at")?,
        last_activity: row.try_get("last_activity")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn sender_from_str(sender: &str) -> MessageSender {
    match sender {
        "user" => MessageSender::User,
        _ => MessageSender::Assistant,
    }
}

fn sender_as_str(sender: MessageSender) -> &'static str {
    match sender {
        MessageSender::User => "user",
        MessageSender::Assistant => "assistant",
    }
}

#[async_trait]
impl ConversationStorage for PostgresStorage {
    async fn create_conversation(&self, conversation: ConversationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_conversations
                (session_id, current_step, conversation_data, status, qualification_score,
                 lead_data, started_at, last_activity, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&conversation.session_id)
        .bind(&conversation.current_step)
        .bind(Json(&conversation.conversation_data))
        .bind(conversation.status.as_str())
        .bind(conversation.qualification_score.map(i16::from))
        .bind(conversation.lead_data.as_ref().map(Json))
        .bind(conversation.started_at)
        .bind(conversation.last_activity)
        .bind(conversation.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_conversation(&self, session_id: &str) -> Result<Option<ConversationRecord>> {
        let row = sqlx::query("SELECT * FROM chat_conversations WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn update_conversation(&self, conversation: &ConversationRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE chat_conversations
            SET current_step = $2, conversation_data = $3, status = $4,
                qualification_score = $5, lead_data = $6, last_activity = $7,
                completed_at = $8
            WHERE session_id = $1
            "#,
        )
        .bind(&conversation.session_id)
        .bind(&conversation.current_step)
        .bind(Json(&conversation.conversation_data))
        .bind(conversation.status.as_str())
        .bind(conversation.qualification_score.map(i16::from))
        .bind(conversation.lead_data.as_ref().map(Json))
        .bind(conversation.last_activity)
        .bind(conversation.completed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(FlowError::SessionNotFound(conversation.session_id.clone()));
        }
        Ok(())
    }

    async fn append_message(&self, message: ChatMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages
                (id, conversation_id, message_type, message_content, sender, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id)
        .bind(&message.conversation_id)
        .bind(&message.message_type)
        .bind(&message.message_content)
        .bind(sender_as_str(message.sender))
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE conversation_id = $1 ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let sender: String = row.try_get("sender")?;
                Ok(ChatMessage {
                    id: row.try_get("id")?,
                    conversation_id: row.try_get("conversation_id")?,
                    message_type: row.try_get("message_type")?,
                    message_content: row.try_get("message_content")?,
                    sender: sender_from_str(&sender),
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LeadStorage for PostgresStorage {
    async fn create_lead(&self, lead: &LeadRecord) -> Result<()> {
        let status = if lead.is_qualified() {
            "qualified"
        } else {
            "unqualified"
        };
        sqlx::query(
            r#"
            INSERT INTO qualified_leads
                (id, conversation_id, zip_code, qualification_score, status, record, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(lead.id)
        .bind(&lead.conversation_id)
        .bind(&lead.zip_code)
        .bind(i16::from(lead.qualification_score))
        .bind(status)
        .bind(Json(lead))
        .bind(lead.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_lead_by_conversation(&self, session_id: &str) -> Result<Option<LeadRecord>> {
        let row = sqlx::query(
            "SELECT record FROM qualified_leads WHERE conversation_id = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            row.try_get::<Json<LeadRecord>, _>("record")
                .map(|json| json.0)
                .map_err(FlowError::from)
        })
        .transpose()
    }

    async fn create_contractor_match(&self, contractor_match: &ContractorMatch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contractor_matches (id, lead_id, match_score, status, record)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(contractor_match.id)
        .bind(contractor_match.lead_id)
        .bind(i16::from(contractor_match.match_score))
        .bind(contractor_match.status.as_str())
        .bind(Json(contractor_match))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_contractor_matches(&self, lead_id: Uuid) -> Result<Vec<ContractorMatch>> {
        let rows = sqlx::query("SELECT record FROM contractor_matches WHERE lead_id = $1")
            .bind(lead_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                row.try_get::<Json<ContractorMatch>, _>("record")
                    .map(|json| json.0)
                    .map_err(FlowError::from)
            })
            .collect()
    }

    async fn create_lead_document(&self, document: &LeadDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lead_documents
                (id, lead_id, document_type, file_name, file_path, file_size, mime_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(document.id)
        .bind(document.lead_id)
        .bind(&document.document_type)
        .bind(&document.file_name)
        .bind(&document.file_path)
        .bind(document.file_size as i64)
        .bind(&document.mime_type)
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
