use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for job-derived correlation ids.
const JOB_CORRELATION_NAMESPACE: Uuid = Uuid::from_u128(0x6d61_7463_6866_6c6f_772d_6a6f_622d_6964);

/// Wire-format envelope for everything that crosses the bus.
///
/// The `topic` doubles as the event type for completion events. Payloads are
/// MessagePack; `correlation_id` ties together all messages about one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Routing topic for PUB/SUB filtering (e.g. "image.keypoints.completed").
    pub topic: String,

    /// MessagePack-encoded payload bytes.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,

    /// When this message was created.
    pub timestamp: DateTime<Utc>,

    pub correlation_id: Uuid,

    /// Schema version for forward-compatible evolution.
    #[serde(default = "default_version")]
    pub version: u16,
}

fn default_version() -> u16 {
    1
}

impl Message {
    /// Create a new message with a random correlation id.
    pub fn new<T: Serialize>(
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Self::with_correlation(topic, payload, Uuid::new_v4())
    }

    /// Create a message with an explicit correlation ID.
    pub fn with_correlation<T: Serialize>(
        topic: impl Into<String>,
        payload: &T,
        correlation_id: Uuid,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            topic: topic.into(),
            payload: rmp_serde::to_vec_named(payload)?,
            timestamp: Utc::now(),
            correlation_id,
            version: 1,
        })
    }

    /// Create a message correlated by job: the same `job_id` always yields
    /// the same correlation id.
    pub fn for_job<T: Serialize>(
        topic: impl Into<String>,
        job_id: &str,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Self::with_correlation(topic, payload, job_correlation_id(job_id))
    }

    /// Deserialize the payload into the expected type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    /// Decode the payload as an untyped JSON value (for schema validation).
    pub fn decode_value(&self) -> Result<serde_json::Value, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    /// Serialize this entire message envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize a message envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// Deterministic correlation id for a job.
pub fn job_correlation_id(job_id: &str) -> Uuid {
    Uuid::new_v5(&JOB_CORRELATION_NAMESPACE, job_id.as_bytes())
}

/// Serde helper to handle `Vec<u8>` as raw bytes in MessagePack.
mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_survives_bytes() {
        let msg = Message::new("image.keypoints.completed", &json!({"job_id": "J1"})).unwrap();
        let decoded = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.topic, "image.keypoints.completed");
        assert_eq!(decoded.correlation_id, msg.correlation_id);
        assert_eq!(decoded.version, 1);
    }

    #[test]
    fn struct_payload_decodes_as_json_object() {
        #[derive(Serialize)]
        struct Done<'a> {
            event_id: &'a str,
            job_id: &'a str,
            has_partial_completion: bool,
        }

        let msg = Message::new(
            "video.keypoints.completed",
            &Done { event_id: "e1", job_id: "J1", has_partial_completion: true },
        )
        .unwrap();

        let value = msg.decode_value().unwrap();
        assert_eq!(value["event_id"], "e1");
        assert_eq!(value["job_id"], "J1");
        assert_eq!(value["has_partial_completion"], true);
    }

    #[test]
    fn job_correlation_is_stable() {
        let a = Message::for_job("match.request", "J1", &1u8).unwrap();
        let b = Message::for_job("job.completed", "J1", &2u8).unwrap();
        let c = Message::for_job("job.completed", "J2", &2u8).unwrap();

        assert_eq!(a.correlation_id, b.correlation_id);
        assert_ne!(a.correlation_id, c.correlation_id);
    }
}
