use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no player sprite sets could be loaded")]
    NoSpriteSets,

    #[error("failed to load asset {path}: {reason}")]
    Asset { path: String, reason: String },

    #[error("invalid collision data in {path}: {source}")]
    CollisionData {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
