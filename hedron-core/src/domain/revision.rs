//! Revision domain types and state machine

use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::JobStatus;
use super::meta::{Kind, ObjectMeta, Resource};
use super::naming::ContentHash;
use super::project::{Image, Repository};

/// One resolved, immutable build input: a Project's source at one content hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub metadata: ObjectMeta,
    pub spec: RevisionSpec,
    #[serde(default)]
    pub status: RevisionStatus,
}

impl Resource for Revision {
    const KIND: Kind = Kind::Revision;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSpec {
    /// Name of the Project, in the Revision's namespace
    pub project_ref: String,
    pub content_hash: ContentHash,

    /// Project image as it was when the Revision was created. Later Project
    /// edits only reach new Revisions.
    #[serde(default)]
    pub image: Image,

    #[serde(default)]
    pub repository: Repository,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionStatus {
    #[serde(default)]
    pub state: RevisionState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,

    /// Why the Revision is where it is: a terminal outcome, or the reason it
    /// cannot make progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Revision lifecycle
///
/// `Pending → Building → {Ready, Failed}`. `Ready` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevisionState {
    #[default]
    Pending,
    Building,
    Ready,
    Failed,
}

impl RevisionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RevisionState::Ready | RevisionState::Failed)
    }

    /// Folds an observation of the Revision's Job into the next state
    ///
    /// Terminal states never change. A failure signal wins over success when
    /// both are reported. A Job that exists but has not started leaves the
    /// Revision where it is: `Building` never falls back to `Pending`.
    pub fn fold(self, job: Option<&JobStatus>) -> RevisionState {
        if self.is_terminal() {
            return self;
        }

        let Some(job) = job else {
            return self;
        };

        if job.failed >= 1 {
            RevisionState::Failed
        } else if job.succeeded >= 1 {
            RevisionState::Ready
        } else if job.active >= 1 {
            RevisionState::Building
        } else {
            self
        }
    }
}

impl fmt::Display for RevisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RevisionState::Pending => "Pending",
            RevisionState::Building => "Building",
            RevisionState::Ready => "Ready",
            RevisionState::Failed => "Failed",
        };
        f.write_str(s)
    }
}
