pub mod address;
pub mod data;
pub mod engine;
pub mod error;
pub mod lead;
pub mod matching;
pub mod runner;
pub mod scoring;
pub mod steps;
pub mod storage;

#[cfg(feature = "postgres")]
pub mod storage_postgres;
#[cfg(feature = "rest")]
pub mod storage_rest;

// Re-export commonly used types
pub use address::{ParsedAddress, parse_address};
pub use data::ConversationData;
pub use engine::{ConversationEngine, TurnOutcome};
pub use error::{FlowError, Result};
pub use lead::{LeadBuild, LeadRecord, build_lead};
pub use matching::{Contractor, ContractorMatch, ContractorMatcher, SampleContractorMatcher};
pub use runner::{LeadFlowRunner, PhotoUpload, QualificationOutcome};
pub use scoring::{LeadScore, Priority, score};
pub use steps::{Step, StepDefinition, StepTable};
pub use storage::{
    BlobStorage, ChatMessage, ConversationRecord, ConversationStatus, ConversationStorage,
    InMemoryBlobStorage, InMemoryStorage, LeadDocument, LeadStorage,
};

#[cfg(feature = "postgres")]
pub use storage_postgres::PostgresStorage;
#[cfg(feature = "rest")]
pub use storage_rest::RestStorage;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn runner() -> LeadFlowRunner {
        let storage = Arc::new(InMemoryStorage::new());
        LeadFlowRunner::new(
            ConversationEngine::default(),
            storage.clone(),
            storage,
            Arc::new(InMemoryBlobStorage::new("lead-photos")),
            Arc::new(SampleContractorMatcher::new()),
        )
    }

    #[tokio::test]
    async fn test_turn_is_persisted() {
        let runner = runner();
        let session = runner.start_session().await.unwrap();

        let outcome = runner.take_turn(&session.session_id, "").await.unwrap();
        assert_eq!(outcome.next_step, Step::DamageType);

        let stored = runner.get_session(&session.session_id).await.unwrap();
        assert_eq!(stored.step().unwrap(), Step::DamageType);

        let transcript = runner.transcript(&session.session_id).await.unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].message_type, "bot");
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let runner = runner();
        let err = runner.take_turn("missing", "hello").await.unwrap_err();
        assert!(matches!(err, FlowError::SessionNotFound(_)));
    }
}
