use thiserror::Error;

/// Errors that can occur in the bus client layer.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid endpoint '{0}', expected ipc://<path> or tcp://<host>:<port>")]
    InvalidEndpoint(String),

    #[error("worker error: {0}")]
    Worker(String),
}
