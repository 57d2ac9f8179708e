use lead_flow::{ConversationData, ConversationRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_message: String,
    /// Echoed by the widget; the stored step is used instead.
    pub current_step: Option<String>,
    /// Echoed by the widget; the stored data is used instead.
    pub conversation_data: Option<ConversationData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifyLeadRequest {
    #[serde(default)]
    pub session_id: String,
    pub lead_data: Option<ConversationData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUploadRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub image_data: String,
    #[serde(default)]
    pub file_name: String,
}

/// Wire view of a stored conversation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub current_step: String,
    pub status: String,
    pub conversation_data: ConversationData,
    pub qualification_score: Option<u8>,
    pub started_at: String,
    pub last_activity: String,
    pub completed_at: Option<String>,
}

impl From<ConversationRecord> for SessionResponse {
    fn from(record: ConversationRecord) -> Self {
        Self {
            session_id: record.session_id,
            current_step: record.current_step,
            status: record.status.as_str().to_string(),
            conversation_data: record.conversation_data,
            qualification_score: record.qualification_score,
            started_at: record.started_at.to_rfc3339(),
            last_activity: record.last_activity.to_rfc3339(),
            completed_at: record.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}
