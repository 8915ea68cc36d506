//! Event types emitted while a build runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping every event with identity and ordering metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Position of the event within its run
    pub sequence: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    pub fn sequenced(event: Event, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Everything a build reports while it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Source events
    #[serde(rename = "source.fetched")]
    SourceFetched {
        run_id: Uuid,
        repository: String,
        reference: String,
        commit: Option<String>,
        path: String,
    },

    // Pipeline events
    #[serde(rename = "pipeline.started")]
    PipelineStarted {
        run_id: Uuid,
        phases: Vec<String>,
    },

    #[serde(rename = "phase.started")]
    PhaseStarted {
        run_id: Uuid,
        index: usize,
        total: usize,
        phase: String,
    },

    #[serde(rename = "phase.succeeded")]
    PhaseSucceeded {
        run_id: Uuid,
        index: usize,
        phase: String,
        duration_ms: u64,
    },

    #[serde(rename = "phase.failed")]
    PhaseFailed {
        run_id: Uuid,
        index: usize,
        phase: String,
        error: String,
    },

    #[serde(rename = "pipeline.succeeded")]
    PipelineSucceeded { run_id: Uuid, duration_ms: u64 },

    /// Emitted when a build stops before its image is loaded
    #[serde(rename = "pipeline.aborted")]
    PipelineAborted { run_id: Uuid, reason: String },

    // Artifact events
    #[serde(rename = "artifact.exported")]
    ArtifactExported {
        run_id: Uuid,
        path: String,
        size_bytes: u64,
    },

    #[serde(rename = "artifact.imported")]
    ArtifactImported { path: String, status: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::PhaseStarted {
            run_id: Uuid::nil(),
            index: 0,
            total: 5,
            phase: "detector".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase.started");
        assert_eq!(json["phase"], "detector");
        assert_eq!(json["total"], 5);
    }

    #[test]
    fn test_event_roundtrip() {
        let event = Event::PhaseFailed {
            run_id: Uuid::new_v4(),
            index: 3,
            phase: "builder".to_string(),
            error: "exit status 1".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = EventEnvelope::sequenced(
            Event::ArtifactImported {
                path: "./image.tar".to_string(),
                status: "Loaded image: app:latest".to_string(),
            },
            7,
        );

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["event"]["type"], "artifact.imported");
        assert!(json["event"].get("run_id").is_none());
    }
}
