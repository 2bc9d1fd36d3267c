//! Runtime configuration shared by the transport, the engine and the renderer

use crate::entity::PlayerColor;
use crate::error::{ClientError, Result};
use std::time::Duration;

/// Who the local actor is. The server roster is matched against this.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalIdentity {
    pub id: String,
    pub name: String,
    pub color: PlayerColor,
}

#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Width in tiles. Replaced by the detected width once the map image loads.
    pub width: u32,
    /// Height in tiles.
    pub height: u32,
    pub image_path: String,
    pub collision_path: String,
    /// Tile code marking a solid tile in the collision array.
    pub collision_code: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(16000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP or WebSocket base of the room server.
    pub server: String,
    pub room_id: String,
    pub session_token: Option<String>,
    pub player: LocalIdentity,
    pub map: MapConfig,
    pub sprite_dir: String,
    /// Share of the window width given to the map when no container size is known.
    pub view_scale_target: f32,
    /// Distance in CSS pixels covered by one movement step.
    pub step_px: f32,
    pub debug_collisions: bool,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "http://localhost:8080".to_string(),
            room_id: "lobby".to_string(),
            session_token: None,
            player: LocalIdentity {
                id: "local".to_string(),
                name: "Guest".to_string(),
                color: PlayerColor::Green,
            },
            map: MapConfig {
                width: 75,
                height: 50,
                image_path: "assets/Map/Office_map_v1_16x16.png".to_string(),
                collision_path: "assets/Map/collisions.json".to_string(),
                collision_code: 849,
            },
            sprite_dir: "assets".to_string(),
            view_scale_target: 0.75,
            step_px: 1.0,
            debug_collisions: false,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.room_id.is_empty()
            || !self
                .room_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ClientError::Config(format!(
                "room id {:?} must be non-empty and use only [A-Za-z0-9_-]",
                self.room_id
            )));
        }
        if self.player.id.is_empty() {
            return Err(ClientError::Config("player id must not be empty".into()));
        }
        if self.map.width == 0 || self.map.height == 0 {
            return Err(ClientError::Config(format!(
                "map size {}x{} must be non-zero",
                self.map.width, self.map.height
            )));
        }
        if !(self.step_px > 0.0) {
            return Err(ClientError::Config("step size must be positive".into()));
        }
        if self.reconnect.base.is_zero() || self.reconnect.cap < self.reconnect.base {
            return Err(ClientError::Config(
                "reconnect cap must be at least the (non-zero) base delay".into(),
            ));
        }
        Ok(())
    }

    /// WebSocket URL for the configured room. HTTP bases are rewritten to WS.
    pub fn socket_url(&self) -> String {
        let base = self.server.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/ws?room={}", base, self.room_id)
    }

    /// Cookie header value authenticating the socket for this room.
    pub fn session_cookie(&self) -> Option<String> {
        self.session_token
            .as_ref()
            .map(|token| format!("roomSession.{}={}", self.room_id, token))
    }
}
