//! Topic constants for PUB/SUB routing.
//!
//! Completion events use the worker's event type as the topic, so the topic
//! is also the key into the schema registry.

// ── Inbound completion events ─────────────────────────────────────────────

pub const IMAGE_EMBEDDINGS_COMPLETED: &str = "image.embeddings.completed";

pub const IMAGE_KEYPOINTS_COMPLETED: &str = "image.keypoints.completed";

pub const VIDEO_EMBEDDINGS_COMPLETED: &str = "video.embeddings.completed";

/// May carry `has_partial_completion`.
pub const VIDEO_KEYPOINTS_COMPLETED: &str = "video.keypoints.completed";

/// Fired by the matcher once every candidate pair for a job was scored.
pub const MATCHINGS_PROCESS_COMPLETED: &str = "matchings.process.completed";

/// Fired by the evidence builder once all evidence images were rendered.
pub const EVIDENCES_GENERATION_COMPLETED: &str = "evidences.generation.completed";

/// Every completion event the orchestrator consumes.
pub const COMPLETION_EVENTS: [&str; 6] = [
    IMAGE_EMBEDDINGS_COMPLETED,
    IMAGE_KEYPOINTS_COMPLETED,
    VIDEO_EMBEDDINGS_COMPLETED,
    VIDEO_KEYPOINTS_COMPLETED,
    MATCHINGS_PROCESS_COMPLETED,
    EVIDENCES_GENERATION_COMPLETED,
];

// ── Outbound ──────────────────────────────────────────────────────────────

/// Asks the matcher to match a job's product set against its video set.
pub const MATCH_REQUEST: &str = "match.request";

/// Announces that a job reached its terminal phase.
pub const JOB_COMPLETED: &str = "job.completed";

/// Periodic worker health heartbeat.
pub const WORKER_HEALTH: &str = "worker.health";
