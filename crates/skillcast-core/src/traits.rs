//! Core trait definitions for assessment storage.
//!
//! The engine never talks to a database; the cohort runner pulls data through
//! [`AssessmentSource`], which a storage layer implements. [`Dataset`] is the
//! in-memory implementation used by the file loader and tests.

use async_trait::async_trait;

use crate::model::{Assessment, Dataset, Participant};

/// Read access to participants and their assessments.
///
/// Implementations must return a consistent snapshot for the duration of a
/// call; the engine does not re-read while computing.
#[async_trait]
pub trait AssessmentSource: Send + Sync {
    /// Human-readable source name (e.g. a dataset name or file path).
    fn name(&self) -> &str;

    /// Every participant known to the source.
    async fn participants(&self) -> anyhow::Result<Vec<Participant>>;

    /// All assessments of one participant, in any order.
    async fn assessments(&self, participant_id: &str) -> anyhow::Result<Vec<Assessment>>;
}

#[async_trait]
impl AssessmentSource for Dataset {
    fn name(&self) -> &str {
        &self.name
    }

    async fn participants(&self) -> anyhow::Result<Vec<Participant>> {
        Ok(self.all_participants())
    }

    async fn assessments(&self, participant_id: &str) -> anyhow::Result<Vec<Assessment>> {
        Ok(self.assessments_for(participant_id))
    }
}
