use serde::{Deserialize, Serialize};
use std::fmt;

/// Source pixels per map tile in the map image.
pub const TILE_PX: u32 = 16;
/// Maximum number of chat messages kept in a room's log.
pub const CHAT_LOG_CAPACITY: usize = 100;
/// Minimum spacing between two outbound move messages.
pub const EMIT_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Facing {
    pub const ALL: [Facing; 4] = [Facing::Down, Facing::Up, Facing::Left, Facing::Right];

    /// Parses a wire facing, falling back to `Down` for anything unknown.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "up" => Facing::Up,
            "left" => Facing::Left,
            "right" => Facing::Right,
            _ => Facing::Down,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Up => "up",
            Facing::Down => "down",
            Facing::Left => "left",
            Facing::Right => "right",
        }
    }

    /// Unit step along this facing in screen space (y grows downwards).
    pub fn delta(&self) -> (f32, f32) {
        match self {
            Facing::Up => (0.0, -1.0),
            Facing::Down => (0.0, 1.0),
            Facing::Left => (-1.0, 0.0),
            Facing::Right => (1.0, 0.0),
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            left: x,
            top: y,
            right: x + width,
            bottom: y + height,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Moves every edge inward by `margin`.
    pub fn shrink(&self, margin: f32) -> Self {
        Self {
            left: self.left + margin,
            top: self.top + margin,
            right: self.right - margin,
            bottom: self.bottom - margin,
        }
    }

    /// Strict overlap test; rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && self.right > other.left
            && self.top < other.bottom
            && self.bottom > other.top
    }
}

/// A player record as it arrives from the server. Every field is optional;
/// normalization happens in the client's room store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<f32>,
    #[serde(default, alias = "f", skip_serializing_if = "Option::is_none")]
    pub facing: Option<String>,
}

impl PlayerRecord {
    pub fn with_tile(id: &str, tx: f32, ty: f32, facing: Facing) -> Self {
        Self {
            id: Some(id.to_string()),
            tx: Some(tx),
            ty: Some(ty),
            facing: Some(facing.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Tile coordinates, preferring explicit `tx/ty` over `x/y`.
    pub fn tile(&self) -> (Option<f32>, Option<f32>) {
        (self.tx.or(self.x), self.ty.or(self.y))
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Join,
    StateRequest,
    Move { tx: i32, ty: i32, facing: Facing },
    Chat { text: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Welcome {
        #[serde(rename = "roomId", alias = "room", default)]
        room_id: String,
        #[serde(rename = "selfId", alias = "id", default)]
        self_id: String,
        #[serde(rename = "selfName", alias = "name", default)]
        self_name: String,
        #[serde(default)]
        roster: Option<Vec<PlayerRecord>>,
    },
    Joined(PlayerRecord),
    StateSnapshot {
        #[serde(default)]
        players: Vec<PlayerRecord>,
    },
    Left {
        id: String,
    },
    Move {
        id: String,
        tx: f32,
        ty: f32,
        #[serde(default, alias = "f")]
        facing: Option<String>,
    },
    Chat {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        text: String,
        #[serde(default)]
        at: u64,
    },
    Error {
        #[serde(alias = "msg", default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Parses one text frame. Malformed frames yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::Joined(_) => "joined",
            ServerMessage::StateSnapshot { .. } => "state-snapshot",
            ServerMessage::Left { .. } => "left",
            ServerMessage::Move { .. } => "move",
            ServerMessage::Chat { .. } => "chat",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Unknown => "unknown",
        }
    }
}
