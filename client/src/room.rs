//! Room state store: normalizes inbound frames into a roster and a chat log
//!
//! Every mutation goes through [`RoomState::apply`] (or [`RoomState::apply_event`]
//! for transport events), so the frame loop can drain the network channel into
//! one owner and read a consistent roster afterwards.

use crate::network::TransportEvent;
use log::{debug, info, warn};
use shared::{Facing, PlayerRecord, ServerMessage, CHAT_LOG_CAPACITY};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Normalized occupant as last reported by the server, in tile coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub tx: f32,
    pub ty: f32,
    pub facing: Facing,
}

impl RosterEntry {
    /// Builds an entry from a raw record. Records without an id are rejected.
    pub fn normalize(record: &PlayerRecord) -> Option<Self> {
        let id = record.id.as_deref().filter(|id| !id.is_empty())?;
        let (tx, ty) = record.tile();

        Some(Self {
            id: id.to_string(),
            name: record.name.clone().unwrap_or_else(|| id.to_string()),
            tx: tx.unwrap_or(0.0),
            ty: ty.unwrap_or(0.0),
            facing: record
                .facing
                .as_deref()
                .map(Facing::from_wire)
                .unwrap_or_default(),
        })
    }

    /// Overwrites only the fields present in `record`.
    fn merge(&mut self, record: &PlayerRecord) {
        let (tx, ty) = record.tile();
        if let Some(name) = &record.name {
            self.name = name.clone();
        }
        if let Some(tx) = tx {
            self.tx = tx;
        }
        if let Some(ty) = ty {
            self.ty = ty;
        }
        if let Some(facing) = &record.facing {
            self.facing = Facing::from_wire(facing);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Local sequence number; the server does not assign message ids.
    pub id: u64,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    /// Server timestamp in milliseconds since the epoch.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting { retry_in: Duration },
}

/// Identity the server announced for this connection in its `welcome` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub room_id: String,
    pub self_id: String,
    pub self_name: String,
}

/// What a single applied frame changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomUpdate {
    Roster,
    Chat,
    Session,
    Status,
    Error,
    Unchanged,
}

pub struct RoomState {
    room_id: String,
    roster: HashMap<String, RosterEntry>,
    roster_version: u64,
    chat: VecDeque<ChatMessage>,
    next_chat_id: u64,
    session: Option<SessionInfo>,
    status: ConnectionStatus,
    last_error: Option<String>,
}

impl RoomState {
    pub fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            roster: HashMap::new(),
            roster_version: 0,
            chat: VecDeque::with_capacity(CHAT_LOG_CAPACITY),
            next_chat_id: 1,
            session: None,
            status: ConnectionStatus::Connecting,
            last_error: None,
        }
    }

    pub fn roster(&self) -> &HashMap<String, RosterEntry> {
        &self.roster
    }

    /// Display names of everyone in the room, sorted case-insensitively.
    pub fn occupant_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.roster.values().map(|entry| entry.name.as_str()).collect();
        names.sort_by_cached_key(|name| name.to_lowercase());
        names
    }

    /// Bumped every time the roster contents change.
    pub fn roster_version(&self) -> u64 {
        self.roster_version
    }

    /// Chat log, most recent first.
    pub fn chat(&self) -> &VecDeque<ChatMessage> {
        &self.chat
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    pub fn room_id(&self) -> Option<&str> {
        match &self.session {
            Some(session) if !session.room_id.is_empty() => Some(&session.room_id),
            _ if !self.room_id.is_empty() => Some(&self.room_id),
            _ => None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn apply_event(&mut self, event: TransportEvent) -> RoomUpdate {
        match event {
            TransportEvent::Connected => {
                self.status = ConnectionStatus::Connected;
                self.last_error = None;
                RoomUpdate::Status
            }
            TransportEvent::Disconnected { retry_in } => {
                self.status = ConnectionStatus::Reconnecting { retry_in };
                RoomUpdate::Status
            }
            TransportEvent::Message(message) => self.apply(message),
        }
    }

    pub fn apply(&mut self, message: ServerMessage) -> RoomUpdate {
        match message {
            ServerMessage::Welcome {
                room_id,
                self_id,
                self_name,
                roster,
            } => {
                info!(
                    "Welcome to room {} as {} ({})",
                    room_id, self_name, self_id
                );
                self.session = Some(SessionInfo {
                    room_id,
                    self_id,
                    self_name,
                });

                match roster {
                    Some(players) if !players.is_empty() => self.replace_roster(&players),
                    _ => RoomUpdate::Session,
                }
            }

            ServerMessage::StateSnapshot { players } => self.replace_roster(&players),

            ServerMessage::Joined(record) => {
                let Some(normalized) = RosterEntry::normalize(&record) else {
                    return RoomUpdate::Unchanged;
                };
                debug!("{} ({}) joined", normalized.name, normalized.id);

                let changed = match self.roster.get_mut(&normalized.id) {
                    Some(entry) => {
                        let before = entry.clone();
                        entry.merge(&record);
                        *entry != before
                    }
                    None => {
                        self.roster.insert(normalized.id.clone(), normalized);
                        true
                    }
                };
                self.mark_roster(changed)
            }

            ServerMessage::Left { id } => {
                let removed = self.roster.remove(&id).is_some();
                if removed {
                    debug!("{} left", id);
                }
                self.mark_roster(removed)
            }

            ServerMessage::Move {
                id,
                tx,
                ty,
                facing,
            } => {
                if id.is_empty() {
                    return RoomUpdate::Unchanged;
                }
                let facing = facing.as_deref().map(Facing::from_wire);

                let changed = match self.roster.get_mut(&id) {
                    Some(entry) => {
                        let before = entry.clone();
                        entry.tx = tx;
                        entry.ty = ty;
                        if let Some(facing) = facing {
                            entry.facing = facing;
                        }
                        *entry != before
                    }
                    None => {
                        self.roster.insert(
                            id.clone(),
                            RosterEntry {
                                name: id.clone(),
                                id,
                                tx,
                                ty,
                                facing: facing.unwrap_or_default(),
                            },
                        );
                        true
                    }
                };
                self.mark_roster(changed)
            }

            ServerMessage::Chat { id, name, text, at } => {
                let message = ChatMessage {
                    id: self.next_chat_id,
                    sender_name: name.unwrap_or_else(|| id.clone()),
                    sender_id: id,
                    text,
                    timestamp: at,
                };
                self.next_chat_id += 1;

                self.chat.push_front(message);
                self.chat.truncate(CHAT_LOG_CAPACITY);
                RoomUpdate::Chat
            }

            ServerMessage::Error { message } => {
                warn!("Server error: {}", message);
                self.last_error = Some(message);
                RoomUpdate::Error
            }

            ServerMessage::Unknown => RoomUpdate::Unchanged,
        }
    }

    fn replace_roster(&mut self, players: &[PlayerRecord]) -> RoomUpdate {
        let roster: HashMap<String, RosterEntry> = players
            .iter()
            .filter_map(RosterEntry::normalize)
            .map(|entry| (entry.id.clone(), entry))
            .collect();

        let changed = roster != self.roster;
        self.roster = roster;
        self.mark_roster(changed)
    }

    fn mark_roster(&mut self, changed: bool) -> RoomUpdate {
        if changed {
            self.roster_version += 1;
            RoomUpdate::Roster
        } else {
            RoomUpdate::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> PlayerRecord {
        PlayerRecord {
            id: Some(id.to_string()),
            ..PlayerRecord::default()
        }
    }

    fn chat(id: &str, text: &str, at: u64) -> ServerMessage {
        ServerMessage::Chat {
            id: id.to_string(),
            name: Some(format!("user-{}", id)),
            text: text.to_string(),
            at,
        }
    }

    #[test]
    fn test_occupant_names_sorted() {
        let mut room = RoomState::new("lobby");
        assert!(room.occupant_names().is_empty());

        room.apply(ServerMessage::StateSnapshot {
            players: vec![
                PlayerRecord {
                    name: Some("bo".to_string()),
                    ..record("p1")
                },
                PlayerRecord {
                    name: Some("Ana".to_string()),
                    ..record("p2")
                },
                record("p3"),
            ],
        });

        assert_eq!(room.occupant_names(), vec!["Ana", "bo", "p3"]);
    }

    #[test]
    fn test_normalize_defaults() {
        let entry = RosterEntry::normalize(&record("p1")).unwrap();
        assert_eq!(
            entry,
            RosterEntry {
                id: "p1".to_string(),
                name: "p1".to_string(),
                tx: 0.0,
                ty: 0.0,
                facing: Facing::Down,
            }
        );
    }

    #[test]
    fn test_normalize_pixel_and_tile_coordinates() {
        let from_pixels = PlayerRecord {
            x: Some(3.0),
            y: Some(4.0),
            facing: Some("left".to_string()),
            ..record("p1")
        };
        let entry = RosterEntry::normalize(&from_pixels).unwrap();
        assert_eq!((entry.tx, entry.ty, entry.facing), (3.0, 4.0, Facing::Left));

        let from_tiles = PlayerRecord {
            x: Some(3.0),
            tx: Some(9.0),
            ty: Some(8.0),
            ..record("p1")
        };
        let entry = RosterEntry::normalize(&from_tiles).unwrap();
        assert_eq!((entry.tx, entry.ty), (9.0, 8.0));
    }

    #[test]
    fn test_normalize_rejects_missing_id() {
        assert!(RosterEntry::normalize(&PlayerRecord::default()).is_none());
        assert!(RosterEntry::normalize(&record("")).is_none());
    }

    #[test]
    fn test_snapshot_replaces_roster() {
        let mut room = RoomState::new("r1");
        room.apply(ServerMessage::Joined(record("old")));

        let update = room.apply(ServerMessage::StateSnapshot {
            players: vec![record("a"), record("b"), PlayerRecord::default()],
        });

        assert_eq!(update, RoomUpdate::Roster);
        assert_eq!(room.roster().len(), 2);
        assert!(room.roster().contains_key("a"));
        assert!(!room.roster().contains_key("old"));
        assert!(room.roster().keys().all(|id| !id.is_empty()));
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let players = vec![
            PlayerRecord::with_tile("a", 1.0, 2.0, Facing::Up),
            PlayerRecord::with_tile("b", 3.0, 4.0, Facing::Right),
        ];
        let mut room = RoomState::new("r1");

        room.apply(ServerMessage::StateSnapshot {
            players: players.clone(),
        });
        let first = room.roster().clone();
        let version = room.roster_version();

        let update = room.apply(ServerMessage::StateSnapshot { players });
        assert_eq!(room.roster(), &first);
        assert_eq!(update, RoomUpdate::Unchanged);
        assert_eq!(room.roster_version(), version);
    }

    #[test]
    fn test_welcome_roster_is_applied() {
        let mut room = RoomState::new("r1");
        let update = room.apply(ServerMessage::Welcome {
            room_id: "r1".to_string(),
            self_id: "s1".to_string(),
            self_name: "Ana".to_string(),
            roster: Some(vec![record("s1"), record("s2")]),
        });

        assert_eq!(update, RoomUpdate::Roster);
        assert_eq!(room.roster().len(), 2);
        assert_eq!(room.session().unwrap().self_id, "s1");
    }

    #[test]
    fn test_welcome_without_roster_keeps_roster() {
        let mut room = RoomState::new("r1");
        room.apply(ServerMessage::Joined(record("a")));

        let update = room.apply(ServerMessage::Welcome {
            room_id: "r1".to_string(),
            self_id: "s1".to_string(),
            self_name: "Ana".to_string(),
            roster: Some(Vec::new()),
        });

        assert_eq!(update, RoomUpdate::Session);
        assert_eq!(room.roster().len(), 1);
    }

    #[test]
    fn test_joined_preserves_absent_fields() {
        let mut room = RoomState::new("r1");
        room.apply(ServerMessage::StateSnapshot {
            players: vec![PlayerRecord {
                name: Some("Ana".to_string()),
                ..PlayerRecord::with_tile("a", 5.0, 6.0, Facing::Left)
            }],
        });

        let update = room.apply(ServerMessage::Joined(PlayerRecord {
            name: Some("Ana B".to_string()),
            ..record("a")
        }));

        assert_eq!(update, RoomUpdate::Roster);
        let entry = &room.roster()["a"];
        assert_eq!(entry.name, "Ana B");
        assert_eq!((entry.tx, entry.ty), (5.0, 6.0));
        assert_eq!(entry.facing, Facing::Left);
    }

    #[test]
    fn test_joined_creates_new_entry() {
        let mut room = RoomState::new("r1");
        let update = room.apply(ServerMessage::Joined(PlayerRecord {
            name: Some("Bo".to_string()),
            ..record("b")
        }));

        assert_eq!(update, RoomUpdate::Roster);
        assert_eq!(room.roster()["b"].name, "Bo");
        assert_eq!(room.roster_version(), 1);
    }

    #[test]
    fn test_left_removes_entry() {
        let mut room = RoomState::new("r1");
        room.apply(ServerMessage::Joined(record("a")));

        assert_eq!(
            room.apply(ServerMessage::Left { id: "a".to_string() }),
            RoomUpdate::Roster
        );
        assert!(room.roster().is_empty());
        assert_eq!(
            room.apply(ServerMessage::Left { id: "a".to_string() }),
            RoomUpdate::Unchanged
        );
    }

    #[test]
    fn test_move_merges_and_keeps_name() {
        let mut room = RoomState::new("r1");
        room.apply(ServerMessage::Joined(PlayerRecord {
            name: Some("Ana".to_string()),
            ..record("a")
        }));

        room.apply(ServerMessage::Move {
            id: "a".to_string(),
            tx: 7.0,
            ty: 8.0,
            facing: Some("up".to_string()),
        });

        let entry = &room.roster()["a"];
        assert_eq!(entry.name, "Ana");
        assert_eq!((entry.tx, entry.ty, entry.facing), (7.0, 8.0, Facing::Up));
    }

    #[test]
    fn test_move_creates_unknown_entry() {
        let mut room = RoomState::new("r1");
        room.apply(ServerMessage::Move {
            id: "ghost".to_string(),
            tx: 1.0,
            ty: 1.0,
            facing: None,
        });

        let entry = &room.roster()["ghost"];
        assert_eq!(entry.name, "ghost");
        assert_eq!(entry.facing, Facing::Down);
    }

    #[test]
    fn test_chat_log_is_bounded_and_most_recent_first() {
        let mut room = RoomState::new("r1");
        for i in 0..250u64 {
            room.apply(chat("a", &format!("message {}", i), 1_000 + i));
        }

        assert_eq!(room.chat().len(), CHAT_LOG_CAPACITY);
        assert_eq!(room.chat()[0].text, "message 249");
        assert_eq!(room.chat()[99].text, "message 150");
        assert!(room
            .chat()
            .iter()
            .zip(room.chat().iter().skip(1))
            .all(|(newer, older)| newer.id > older.id && newer.timestamp >= older.timestamp));
    }

    #[test]
    fn test_chat_without_name_uses_sender_id() {
        let mut room = RoomState::new("r1");
        room.apply(ServerMessage::Chat {
            id: "p9".to_string(),
            name: None,
            text: "hey".to_string(),
            at: 5,
        });
        assert_eq!(room.chat()[0].sender_name, "p9");
        assert_eq!(room.chat()[0].sender_id, "p9");
    }

    #[test]
    fn test_error_and_unknown_frames() {
        let mut room = RoomState::new("r1");
        assert_eq!(
            room.apply(ServerMessage::Error {
                message: "nope".to_string()
            }),
            RoomUpdate::Error
        );
        assert_eq!(room.last_error(), Some("nope"));

        assert_eq!(room.apply(ServerMessage::Unknown), RoomUpdate::Unchanged);
        assert!(room.roster().is_empty());
    }

    #[test]
    fn test_transport_events_update_status() {
        let mut room = RoomState::new("r1");
        assert_eq!(room.status(), ConnectionStatus::Connecting);

        room.apply_event(TransportEvent::Connected);
        assert!(room.is_connected());

        let retry_in = Duration::from_secs(2);
        room.apply_event(TransportEvent::Disconnected { retry_in });
        assert_eq!(room.status(), ConnectionStatus::Reconnecting { retry_in });

        room.apply_event(TransportEvent::Message(ServerMessage::Joined(record("a"))));
        assert_eq!(room.roster().len(), 1);
    }

    #[test]
    fn test_room_id_prefers_session() {
        let mut room = RoomState::new("configured");
        assert_eq!(room.room_id(), Some("configured"));

        room.apply(ServerMessage::Welcome {
            room_id: "announced".to_string(),
            self_id: "s1".to_string(),
            self_name: "Ana".to_string(),
            roster: None,
        });
        assert_eq!(room.room_id(), Some("announced"));
    }
}
