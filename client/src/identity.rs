//! Works out which roster entry, if any, is the local actor.
//!
//! The server does not flag the local player in its roster, so the match is
//! inferred. Rules, first match wins:
//!
//! 1. an entry whose id is the local id;
//! 2. an entry whose id is the session id the server announced in `welcome`;
//! 3. the only entry carrying the local name;
//! 4. the only entry in the roster;
//! 5. the only entry whose tile centre lies within [`PROXIMITY_THRESHOLD_PX`]
//!    of the last position the local actor reported.
//!
//! A rule that matches more than one entry is skipped. If nothing matches,
//! every entry is treated as remote.

use crate::config::LocalIdentity;
use crate::room::RosterEntry;
use std::collections::HashMap;

pub const PROXIMITY_THRESHOLD_PX: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfMatch {
    Id(String),
    Session(String),
    Name(String),
    Singleton(String),
    Proximity(String),
    Unresolved,
}

impl SelfMatch {
    pub fn id(&self) -> Option<&str> {
        match self {
            SelfMatch::Id(id)
            | SelfMatch::Session(id)
            | SelfMatch::Name(id)
            | SelfMatch::Singleton(id)
            | SelfMatch::Proximity(id) => Some(id),
            SelfMatch::Unresolved => None,
        }
    }
}

fn only<'a>(mut candidates: impl Iterator<Item = &'a RosterEntry>) -> Option<&'a RosterEntry> {
    let first = candidates.next()?;
    match candidates.next() {
        Some(_) => None,
        None => Some(first),
    }
}

pub fn resolve_self(
    roster: &HashMap<String, RosterEntry>,
    local: &LocalIdentity,
    session_id: Option<&str>,
    tile_size: f32,
    last_local_px: Option<(f32, f32)>,
) -> SelfMatch {
    if roster.contains_key(&local.id) {
        return SelfMatch::Id(local.id.clone());
    }

    if let Some(id) = session_id.filter(|id| roster.contains_key(*id)) {
        return SelfMatch::Session(id.to_string());
    }

    if let Some(entry) = only(roster.values().filter(|entry| entry.name == local.name)) {
        return SelfMatch::Name(entry.id.clone());
    }

    if roster.len() == 1 {
        if let Some(entry) = roster.values().next() {
            return SelfMatch::Singleton(entry.id.clone());
        }
    }

    if let Some((lx, ly)) = last_local_px {
        let near = roster.values().filter(|entry| {
            let x = entry.tx * tile_size + tile_size / 2.0;
            let y = entry.ty * tile_size + tile_size / 2.0;
            (x - lx).abs() < PROXIMITY_THRESHOLD_PX && (y - ly).abs() < PROXIMITY_THRESHOLD_PX
        });
        if let Some(entry) = only(near) {
            return SelfMatch::Proximity(entry.id.clone());
        }
    }

    SelfMatch::Unresolved
}

/// Roster entries that should be drawn as remote actors. Drops the resolved
/// self as well as anything sharing the local id or name.
pub fn remote_entries<'a>(
    roster: &'a HashMap<String, RosterEntry>,
    local: &LocalIdentity,
    resolved: &SelfMatch,
) -> impl Iterator<Item = &'a RosterEntry> {
    let self_id = resolved.id().map(str::to_string);
    let local_id = local.id.clone();
    let local_name = local.name.clone();

    roster.values().filter(move |entry| {
        Some(entry.id.as_str()) != self_id.as_deref()
            && entry.id != local_id
            && entry.name != local_name
    })
}
