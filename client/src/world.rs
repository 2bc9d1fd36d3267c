//! Static collision index built from the map's per-tile code array

use crate::entity::Collidable;
use log::{info, warn};
use shared::Rect;

/// Inward shrink applied to a hitbox before testing, so touching a neighbouring
/// tile's edge never counts as a hit.
pub const COLLISION_MARGIN: f32 = 2.0;

pub struct CollisionWorld {
    width: u32,
    height: u32,
    collision_code: i32,
    codes: Vec<i32>,
    solid: Vec<bool>,
    boundaries: Vec<Rect>,
    tile_size: f32,
}

impl CollisionWorld {
    pub fn new(width: u32, height: u32, collision_code: i32, codes: Vec<i32>) -> Self {
        let mut world = Self {
            width,
            height,
            collision_code,
            codes,
            solid: Vec::new(),
            boundaries: Vec::new(),
            tile_size: shared::TILE_PX as f32,
        };
        world.rebuild_index();
        world
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn boundaries(&self) -> &[Rect] {
        &self.boundaries
    }

    pub fn solid_count(&self) -> usize {
        self.solid.iter().filter(|solid| **solid).count()
    }

    /// Changes the grid dimensions (e.g. after detecting them from the map image).
    pub fn reconfigure(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        info!(
            "Collision grid resized from {}x{} to {}x{}",
            self.width, self.height, width, height
        );
        self.width = width;
        self.height = height;
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        let expected = self.width as usize * self.height as usize;
        if self.codes.len() != expected {
            warn!(
                "Collision data has {} entries but the map is {}x{} ({} tiles); collisions may be off",
                self.codes.len(),
                self.width,
                self.height,
                expected
            );
        }

        self.solid = (0..expected)
            .map(|index| self.codes.get(index) == Some(&self.collision_code))
            .collect();
        self.rebuild_boundaries(self.tile_size);
    }

    /// Recomputes boundary rectangles for a new tile size in CSS pixels.
    pub fn rebuild_boundaries(&mut self, tile_size: f32) {
        self.tile_size = tile_size;
        let width = self.width as usize;

        self.boundaries = self
            .solid
            .iter()
            .enumerate()
            .filter(|(_, solid)| **solid)
            .map(|(index, _)| {
                let col = (index % width) as f32;
                let row = (index / width) as f32;
                Rect::new(col * tile_size, row * tile_size, tile_size, tile_size)
            })
            .collect();
    }

    pub fn is_solid(&self, tx: i32, ty: i32) -> bool {
        if tx < 0 || ty < 0 || tx as u32 >= self.width || ty as u32 >= self.height {
            return false;
        }
        self.solid[ty as usize * self.width as usize + tx as usize]
    }

    pub fn collides_rect(&self, hitbox: &Rect) -> bool {
        let shrunk = hitbox.shrink(COLLISION_MARGIN);
        self.boundaries
            .iter()
            .any(|boundary| shrunk.intersects(boundary))
    }

    pub fn collides(&self, entity: &impl Collidable) -> bool {
        self.collides_rect(&entity.hitbox())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALL: i32 = 849;

    fn world_with_solid(width: u32, height: u32, solid: &[(u32, u32)]) -> CollisionWorld {
        let mut codes = vec![0; (width * height) as usize];
        for (tx, ty) in solid {
            codes[(ty * width + tx) as usize] = WALL;
        }
        CollisionWorld::new(width, height, WALL, codes)
    }

    #[test]
    fn test_boundaries_follow_solid_tiles() {
        let world = world_with_solid(4, 3, &[(1, 0), (3, 2)]);
        assert_eq!(world.solid_count(), 2);
        assert_eq!(
            world.boundaries(),
            &[Rect::new(16.0, 0.0, 16.0, 16.0), Rect::new(48.0, 32.0, 16.0, 16.0)]
        );
        assert!(world.is_solid(1, 0));
        assert!(!world.is_solid(0, 0));
        assert!(!world.is_solid(-1, 0));
        assert!(!world.is_solid(4, 0));
    }

    #[test]
    fn test_rebuild_boundaries_uses_new_tile_size() {
        let mut world = world_with_solid(4, 3, &[(3, 2)]);
        world.rebuild_boundaries(10.0);
        assert_eq!(world.boundaries(), &[Rect::new(30.0, 20.0, 10.0, 10.0)]);
        assert_eq!(world.tile_size(), 10.0);
    }

    #[test]
    fn test_hitbox_inside_solid_tile_collides() {
        let world = world_with_solid(4, 4, &[(2, 2)]);
        let inside = Rect::new(34.0, 34.0, 8.0, 8.0);
        assert!(world.collides_rect(&inside));
    }

    #[test]
    fn test_hitbox_outside_solid_tiles_does_not_collide() {
        let world = world_with_solid(4, 4, &[(2, 2)]);
        let outside = Rect::new(2.0, 2.0, 8.0, 8.0);
        assert!(!world.collides_rect(&outside));
    }

    #[test]
    fn test_margin_ignores_edge_overlap() {
        let world = world_with_solid(4, 4, &[(2, 2)]);
        // Overlaps the solid tile by 1px, less than the margin
        let grazing = Rect::new(17.0, 32.0, 16.0, 16.0);
        assert!(!world.collides_rect(&grazing));

        let overlapping = Rect::new(20.0, 32.0, 16.0, 16.0);
        assert!(world.collides_rect(&overlapping));
    }

    #[test]
    fn test_size_mismatch_is_best_effort() {
        // Too few codes: missing tiles are treated as open
        let world = CollisionWorld::new(4, 4, WALL, vec![WALL, 0, WALL]);
        assert_eq!(world.solid_count(), 2);
        assert!(world.is_solid(2, 0));
        assert!(!world.is_solid(3, 3));
    }

    #[test]
    fn test_reconfigure_rebuilds_index() {
        let mut world = CollisionWorld::new(2, 2, WALL, vec![0, 0, WALL, 0, 0, 0]);
        assert!(world.is_solid(0, 1));

        world.reconfigure(3, 2);
        assert!(!world.is_solid(0, 1));
        assert!(world.is_solid(2, 0));
        assert_eq!(world.width(), 3);
    }
}
