//! Actors in the room: position, facing, walk animation and hitbox

use crate::error::ClientError;
use shared::{Facing, Rect};
use std::fmt;
use std::str::FromStr;

pub const ANIMATION_FRAME_COUNT: usize = 3;
pub const ANIMATION_FRAME_MS: f32 = 120.0;
/// Standing pose; also the frame the walk cycle starts from.
pub const IDLE_FRAME: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlayerColor {
    Blue,
    Red,
    Yellow,
    Green,
    Purple,
    Pink,
}

impl PlayerColor {
    pub const ALL: [PlayerColor; 6] = [
        PlayerColor::Blue,
        PlayerColor::Red,
        PlayerColor::Yellow,
        PlayerColor::Green,
        PlayerColor::Purple,
        PlayerColor::Pink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerColor::Blue => "blue",
            PlayerColor::Red => "red",
            PlayerColor::Yellow => "yellow",
            PlayerColor::Green => "green",
            PlayerColor::Purple => "purple",
            PlayerColor::Pink => "pink",
        }
    }

    /// Capitalised directory name the sprite strips live under.
    pub fn dir_name(&self) -> &'static str {
        match self {
            PlayerColor::Blue => "Blue",
            PlayerColor::Red => "Red",
            PlayerColor::Yellow => "Yellow",
            PlayerColor::Green => "Green",
            PlayerColor::Purple => "Purple",
            PlayerColor::Pink => "Pink",
        }
    }

    /// Stable colour for a remote actor; the roster carries no colour.
    pub fn for_id(id: &str) -> Self {
        let sum: usize = id.bytes().map(usize::from).sum();
        Self::ALL[sum % Self::ALL.len()]
    }
}

impl fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerColor {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|color| color.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ClientError::Config(format!("unknown player color {:?}", s)))
    }
}

/// One value per facing: sprite strip textures in the renderer, strip sizes in the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Strips<T> {
    pub down: T,
    pub up: T,
    pub left: T,
    pub right: T,
}

impl<T> Strips<T> {
    pub fn uniform(value: T) -> Self
    where
        T: Clone,
    {
        Self {
            down: value.clone(),
            up: value.clone(),
            left: value.clone(),
            right: value,
        }
    }

    pub fn get(&self, facing: Facing) -> &T {
        match facing {
            Facing::Down => &self.down,
            Facing::Up => &self.up,
            Facing::Left => &self.left,
            Facing::Right => &self.right,
        }
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Strips<U> {
        Strips {
            down: f(&self.down),
            up: f(&self.up),
            left: f(&self.left),
            right: f(&self.right),
        }
    }
}

/// Natural pixel size of a sprite strip holding every animation frame side by side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripSize {
    pub width: f32,
    pub height: f32,
}

impl StripSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn frame_width(&self) -> f32 {
        (self.width / ANIMATION_FRAME_COUNT as f32).floor()
    }
}

/// Walk cycle collapsed into one timer.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    frame: usize,
    elapsed_ms: f32,
}

impl Animation {
    pub fn new() -> Self {
        Self {
            frame: IDLE_FRAME,
            elapsed_ms: 0.0,
        }
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn update(&mut self, dt_ms: f32, moving: bool) {
        if !moving {
            self.frame = IDLE_FRAME;
            self.elapsed_ms = 0.0;
            return;
        }

        self.elapsed_ms += dt_ms;
        while self.elapsed_ms >= ANIMATION_FRAME_MS {
            self.elapsed_ms -= ANIMATION_FRAME_MS;
            self.frame = (self.frame + 1) % ANIMATION_FRAME_COUNT;
        }
    }
}

impl Default for Animation {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Local,
    Remote,
}

/// Anything the collision world can test.
pub trait Collidable {
    fn hitbox(&self) -> Rect;
}

/// Anything the renderer can draw from a sprite strip.
pub trait Drawable {
    fn sprite_frame(&self) -> SpriteFrame<'_>;
}

/// Everything the renderer needs to blit one actor.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteFrame<'a> {
    pub color: PlayerColor,
    pub facing: Facing,
    /// Source rectangle inside the strip, in strip pixels.
    pub source: Rect,
    /// Destination rectangle in CSS pixels.
    pub dest: Rect,
    pub label: &'a str,
    pub highlighted: bool,
}

#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub color: PlayerColor,
    pub kind: ActorKind,
    /// Sprite centre in CSS pixels.
    pub x: f32,
    pub y: f32,
    pub facing: Facing,
    pub moving: bool,
    animation: Animation,
    strips: Strips<StripSize>,
    scale: f32,
}

impl Actor {
    pub fn new(
        id: &str,
        name: &str,
        color: PlayerColor,
        kind: ActorKind,
        x: f32,
        y: f32,
        strips: Strips<StripSize>,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            color,
            kind,
            x,
            y,
            facing: Facing::Down,
            moving: false,
            animation: Animation::new(),
            strips,
            scale: 1.0,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Rescales sprite dimensions after the tile size changed.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    pub fn frame_index(&self) -> usize {
        self.animation.frame()
    }

    pub fn update_animation(&mut self, dt_ms: f32, moving: bool) {
        self.moving = moving;
        self.animation.update(dt_ms, moving);
    }

    pub fn tile_position(&self, tile_size: f32) -> (f32, f32) {
        (self.x / tile_size, self.y / tile_size)
    }

    pub fn set_tile_position(&mut self, tx: f32, ty: f32, tile_size: f32) {
        self.x = tx * tile_size;
        self.y = ty * tile_size;
    }

    /// Scaled size of one animation frame for the current facing.
    pub fn sprite_size(&self) -> (f32, f32) {
        let strip = self.strips.get(self.facing);
        (
            (strip.frame_width() * self.scale).round(),
            (strip.height * self.scale).round(),
        )
    }

    /// Feet-only box at the sprite bottom, evaluated at an arbitrary centre.
    pub fn hitbox_at(&self, x: f32, y: f32) -> Rect {
        let (w, h) = self.sprite_size();
        let feet_w = (w * 0.35).floor().max(6.0);
        let feet_h = (h * 0.22).floor().max(4.0);
        let bottom = y + h / 2.0;
        Rect {
            left: x - feet_w / 2.0,
            right: x + feet_w / 2.0,
            top: bottom - feet_h,
            bottom,
        }
    }
}

impl Collidable for Actor {
    fn hitbox(&self) -> Rect {
        self.hitbox_at(self.x, self.y)
    }
}

impl Drawable for Actor {
    fn sprite_frame(&self) -> SpriteFrame<'_> {
        let strip = self.strips.get(self.facing);
        let frame_w = strip.frame_width();
        let (w, h) = self.sprite_size();
        let left = (self.x - w / 2.0).round();
        let top = (self.y - h / 2.0).round();

        SpriteFrame {
            color: self.color,
            facing: self.facing,
            source: Rect::new(self.frame_index() as f32 * frame_w, 0.0, frame_w, strip.height),
            dest: Rect::new(left, top, w, h),
            label: &self.name,
            highlighted: self.kind == ActorKind::Local,
        }
    }
}
