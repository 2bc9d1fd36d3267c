use crate::assets::ColorSets;
use crate::config::{ClientConfig, LocalIdentity};
use crate::entity::{Actor, ActorKind, PlayerColor, StripSize, Strips};
use crate::identity::{remote_entries, resolve_self, SelfMatch};
use crate::rendering::{Surface, Viewport};
use crate::room::{RoomState, RosterEntry};
use crate::world::CollisionWorld;
use log::{debug, info};
use shared::{ClientMessage, Facing, EMIT_INTERVAL_MS, TILE_PX};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

const FIRST_FRAME_MS: f32 = 16.0;
const MAX_FRAME_MS: f32 = 48.0;
/// A remote actor keeps walking this long after its last reported move.
const REMOTE_IDLE_AFTER: Duration = Duration::from_millis(200);

/// Grid dimensions implied by the map image, if it has any pixels at all.
pub fn detect_grid(image_px: (u32, u32)) -> Option<(u32, u32)> {
    let width = (image_px.0 as f32 / TILE_PX as f32).round() as u32;
    let height = (image_px.1 as f32 / TILE_PX as f32).round() as u32;
    if width > 0 && height > 0 {
        Some((width, height))
    } else {
        None
    }
}

/// What one simulation step did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutcome {
    pub moved: bool,
    pub blocked: bool,
    /// Move message to send, when the throttle allows one.
    pub emit: Option<ClientMessage>,
}

pub struct Engine {
    identity: LocalIdentity,
    step_px: f32,
    viewport: Viewport,
    world: CollisionWorld,
    strips: ColorSets<Strips<StripSize>>,
    local: Actor,
    remotes: HashMap<String, Actor>,
    remote_moved_at: HashMap<String, Instant>,
    self_match: SelfMatch,
    synced_version: Option<u64>,
    synced_session: Option<String>,
    prev_frame: Option<Instant>,
    last_emit: Option<Instant>,
    last_emitted_px: Option<(f32, f32)>,
    running: bool,
    watching_resize: bool,
}

impl Engine {
    pub fn new(
        config: &ClientConfig,
        map_image_px: (u32, u32),
        collision_codes: Vec<i32>,
        strips: ColorSets<Strips<StripSize>>,
        surface: Surface,
    ) -> Self {
        let map = &config.map;
        let mut viewport = Viewport::new(map.width, map.height, config.view_scale_target, surface);
        let mut world =
            CollisionWorld::new(map.width, map.height, map.collision_code, collision_codes);

        if let Some((width, height)) = detect_grid(map_image_px) {
            if (width, height) != (map.width, map.height) {
                info!(
                    "Map image implies a {}x{} grid, configured {}x{}",
                    width, height, map.width, map.height
                );
                viewport.set_map_size(width, height);
                world.reconfigure(width, height);
            }
        }
        world.rebuild_boundaries(viewport.tile_size());

        let (width, height) = viewport.map_size();

        let (spawn_x, spawn_y) =
            viewport.tile_center_px((width / 2) as f32, (height / 2) as f32);
        let player = &config.player;
        let mut local = Actor::new(
            &player.id,
            &player.name,
            player.color,
            ActorKind::Local,
            spawn_x,
            spawn_y,
            strips.get(player.color).clone(),
        );
        local.set_scale(viewport.sprite_scale());

        info!(
            "Engine started: {}x{} tiles, {} solid, spawn ({}, {})",
            width,
            height,
            world.solid_count(),
            width / 2,
            height / 2
        );

        Self {
            identity: player.clone(),
            step_px: config.step_px,
            viewport,
            world,
            strips,
            local,
            remotes: HashMap::new(),
            remote_moved_at: HashMap::new(),
            self_match: SelfMatch::Unresolved,
            synced_version: None,
            synced_session: None,
            prev_frame: None,
            last_emit: None,
            last_emitted_px: None,
            running: true,
            watching_resize: true,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn world(&self) -> &CollisionWorld {
        &self.world
    }

    pub fn local(&self) -> &Actor {
        &self.local
    }

    pub fn remotes(&self) -> &HashMap<String, Actor> {
        &self.remotes
    }

    pub fn self_match(&self) -> &SelfMatch {
        &self.self_match
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Tile under the sprite centre, kept inside the grid.
    pub fn local_tile(&self) -> (i32, i32) {
        let (tx, ty) = self.viewport.px_to_tile(self.local.x, self.local.y);
        let (width, height) = self.viewport.map_size();
        (
            tx.clamp(0, width as i32 - 1),
            ty.clamp(0, height as i32 - 1),
        )
    }

    /// Moves the local actor to a pixel position without collision checks.
    pub fn place_local(&mut self, x: f32, y: f32) {
        self.local.x = x;
        self.local.y = y;
    }

    /// One simulation step: move, collide, animate, maybe emit.
    pub fn tick(&mut self, now: Instant, direction: Option<Facing>) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();
        if !self.running {
            return outcome;
        }

        let dt_ms = match self.prev_frame {
            Some(prev) => {
                let elapsed_ms = now.saturating_duration_since(prev).as_secs_f32() * 1000.0;
                elapsed_ms.min(MAX_FRAME_MS)
            }
            None => FIRST_FRAME_MS,
        };
        self.prev_frame = Some(now);

        if let Some(facing) = direction {
            self.local.facing = facing;

            let (dx, dy) = facing.delta();
            let (map_w, map_h) = self.viewport.css_size();
            let next_x = (self.local.x + dx * self.step_px).clamp(0.0, map_w);
            let next_y = (self.local.y + dy * self.step_px).clamp(0.0, map_h);

            if next_x != self.local.x || next_y != self.local.y {
                let (prev_x, prev_y) = (self.local.x, self.local.y);
                self.place_local(next_x, next_y);
                if self.world.collides(&self.local) {
                    self.place_local(prev_x, prev_y);
                    outcome.blocked = true;
                } else {
                    outcome.moved = true;
                }
            }
        }

        self.local.update_animation(dt_ms, outcome.moved);
        for (id, remote) in self.remotes.iter_mut() {
            let walking = self
                .remote_moved_at
                .get(id)
                .map_or(false, |at| now.saturating_duration_since(*at) < REMOTE_IDLE_AFTER);
            remote.update_animation(dt_ms, walking);
        }

        let interval = Duration::from_millis(EMIT_INTERVAL_MS);
        let due = self
            .last_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= interval);
        if outcome.moved && due {
            self.last_emit = Some(now);
            self.last_emitted_px = Some((self.local.x, self.local.y));
            let (tx, ty) = self.local_tile();
            outcome.emit = Some(ClientMessage::Move {
                tx,
                ty,
                facing: self.local.facing,
            });
        }

        outcome
    }

    /// Re-syncs remote actors if the roster or the announced session changed
    /// since the last call.
    pub fn sync_room(&mut self, room: &RoomState, now: Instant) -> bool {
        let version = room.roster_version();
        let session_id = room.session().map(|session| session.self_id.as_str());
        if self.synced_version == Some(version) && self.synced_session.as_deref() == session_id {
            return false;
        }
        self.synced_version = Some(version);
        self.synced_session = session_id.map(str::to_string);
        self.sync_roster(room.roster(), session_id, now);
        true
    }

    pub fn sync_roster(
        &mut self,
        roster: &HashMap<String, RosterEntry>,
        session_id: Option<&str>,
        now: Instant,
    ) {
        let resolved = resolve_self(
            roster,
            &self.identity,
            session_id,
            self.viewport.tile_size(),
            self.last_emitted_px,
        );
        if resolved != self.self_match {
            debug!("Local actor resolved as {:?}", resolved);
        }

        let scale = self.viewport.sprite_scale();
        let mut seen = HashSet::new();

        for entry in remote_entries(roster, &self.identity, &resolved) {
            seen.insert(entry.id.clone());
            let (x, y) = self.viewport.tile_center_px(entry.tx, entry.ty);

            match self.remotes.get_mut(&entry.id) {
                Some(actor) => {
                    if actor.x != x || actor.y != y {
                        actor.x = x;
                        actor.y = y;
                        self.remote_moved_at.insert(entry.id.clone(), now);
                    }
                    actor.facing = entry.facing;
                    actor.name.clone_from(&entry.name);
                }
                None => {
                    let color = PlayerColor::for_id(&entry.id);
                    let mut actor = Actor::new(
                        &entry.id,
                        &entry.name,
                        color,
                        ActorKind::Remote,
                        x,
                        y,
                        self.strips.get(color).clone(),
                    );
                    actor.set_scale(scale);
                    actor.facing = entry.facing;
                    info!("{} ({}) is in the room", entry.name, entry.id);
                    self.remotes.insert(entry.id.clone(), actor);
                }
            }
        }

        self.remotes.retain(|id, actor| {
            let keep = seen.contains(id);
            if !keep {
                info!("{} ({}) left the room", actor.name, id);
            }
            keep
        });
        self.remote_moved_at.retain(|id, _| seen.contains(id));
        self.self_match = resolved;
    }

    /// Re-fits the viewport to a new surface, keeping every actor on its tile.
    pub fn resize(&mut self, surface: Surface) -> bool {
        if !self.watching_resize || surface == self.viewport.surface() {
            return false;
        }

        let old_ts = self.viewport.tile_size();
        self.viewport.size_to(surface);
        let new_ts = self.viewport.tile_size();
        let scale = self.viewport.sprite_scale();

        for actor in std::iter::once(&mut self.local).chain(self.remotes.values_mut()) {
            let (tx, ty) = actor.tile_position(old_ts);
            actor.set_tile_position(tx, ty, new_ts);
            actor.set_scale(scale);
        }
        self.last_emitted_px = self
            .last_emitted_px
            .map(|(x, y)| (x / old_ts * new_ts, y / old_ts * new_ts));

        self.world.rebuild_boundaries(new_ts);
        debug!("Tile size {} -> {}", old_ts, new_ts);
        true
    }

    /// Stops the loop and resize handling. Returns false if already disposed.
    pub fn dispose(&mut self) -> bool {
        if !self.running && !self.watching_resize {
            return false;
        }
        self.running = false;
        self.watching_resize = false;
        info!("Engine disposed");
        true
    }
}
