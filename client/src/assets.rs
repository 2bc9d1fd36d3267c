//! Map image, collision codes and per-colour sprite strips

use crate::config::ClientConfig;
use crate::entity::{PlayerColor, Strips};
use crate::error::{ClientError, Result};
use futures_util::future::{join, join_all, try_join4};
use log::{info, warn};
use macroquad::prelude::*;
use shared::Facing;
use std::collections::BTreeMap;
use std::fmt;

/// One value per loaded player colour. Never empty.
#[derive(Debug, Clone)]
pub struct ColorSets<T> {
    sets: BTreeMap<PlayerColor, T>,
}

impl<T> ColorSets<T> {
    /// Keeps every colour that loaded. Fails only when none did.
    pub fn from_results<E: fmt::Display>(
        results: Vec<(PlayerColor, std::result::Result<T, E>)>,
    ) -> Result<Self> {
        let mut sets = BTreeMap::new();
        for (color, result) in results {
            match result {
                Ok(set) => {
                    sets.insert(color, set);
                }
                Err(e) => warn!("Sprite set {} unavailable: {}", color, e),
            }
        }

        if sets.is_empty() {
            return Err(ClientError::NoSpriteSets);
        }
        Ok(Self { sets })
    }

    pub fn colors(&self) -> impl Iterator<Item = PlayerColor> + '_ {
        self.sets.keys().copied()
    }

    pub fn contains(&self, color: PlayerColor) -> bool {
        self.sets.contains_key(&color)
    }

    /// Set for `color`, falling back to purple and then to the first loaded colour.
    pub fn get(&self, color: PlayerColor) -> &T {
        if let Some(set) = self.sets.get(&color) {
            return set;
        }
        if let Some(set) = self.sets.get(&PlayerColor::Purple) {
            return set;
        }
        let mut loaded = self.sets.values();
        match loaded.next() {
            Some(set) => set,
            None => unreachable!("color sets are never empty"),
        }
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> ColorSets<U> {
        ColorSets {
            sets: self.sets.iter().map(|(color, set)| (*color, f(set))).collect(),
        }
    }
}

pub type SpriteSet = Strips<Texture2D>;

pub struct Assets {
    pub map: Texture2D,
    pub sprites: ColorSets<SpriteSet>,
    pub collision_codes: Vec<i32>,
}

impl Assets {
    /// Loads the map image, the collision codes and every colour's sprites concurrently.
    pub async fn load(config: &ClientConfig) -> Result<Self> {
        let sprite_loads = join_all(PlayerColor::ALL.into_iter().map(|color| async move {
            (color, load_sprite_set(&config.sprite_dir, color).await)
        }));
        let map_loads = join(
            load_strip(config.map.image_path.clone()),
            load_collision_codes(&config.map.collision_path),
        );

        let (sprite_results, (map, collision_codes)) = join(sprite_loads, map_loads).await;
        let map = map?;
        let collision_codes = collision_codes?;
        let sprites = ColorSets::from_results(sprite_results)?;

        if !sprites.contains(config.player.color) {
            warn!(
                "Sprites for {} missing, drawing the local player with a fallback colour",
                config.player.color
            );
        }

        info!(
            "Assets loaded: map {}x{}px, {} collision codes, {} sprite sets",
            map.width(),
            map.height(),
            collision_codes.len(),
            sprites.colors().count()
        );

        Ok(Self {
            map,
            sprites,
            collision_codes,
        })
    }
}

pub fn sprite_path(dir: &str, color: PlayerColor, facing: Facing) -> String {
    format!(
        "{}/{}/neo_{}_{}.png",
        dir,
        color.dir_name(),
        color.as_str(),
        facing.as_str()
    )
}

async fn load_sprite_set(dir: &str, color: PlayerColor) -> Result<SpriteSet> {
    let (down, up, left, right) = try_join4(
        load_strip(sprite_path(dir, color, Facing::Down)),
        load_strip(sprite_path(dir, color, Facing::Up)),
        load_strip(sprite_path(dir, color, Facing::Left)),
        load_strip(sprite_path(dir, color, Facing::Right)),
    )
    .await?;

    Ok(Strips {
        down,
        up,
        left,
        right,
    })
}

async fn load_strip(path: String) -> Result<Texture2D> {
    let texture = load_texture(&path).await.map_err(|e| ClientError::Asset {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    texture.set_filter(FilterMode::Nearest);
    Ok(texture)
}

async fn load_collision_codes(path: &str) -> Result<Vec<i32>> {
    let text = load_string(path).await.map_err(|e| ClientError::Asset {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    parse_collision_codes(path, &text)
}

/// The collision file is a flat JSON array of tile codes in row-major order.
pub fn parse_collision_codes(path: &str, text: &str) -> Result<Vec<i32>> {
    serde_json::from_str(text).map_err(|source| ClientError::CollisionData {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sets(results: Vec<(PlayerColor, std::result::Result<u32, String>)>) -> ColorSets<u32> {
        ColorSets::from_results(results).unwrap()
    }

    #[test]
    fn test_all_sets_failing_is_fatal() {
        let results: Vec<(PlayerColor, std::result::Result<u32, String>)> = PlayerColor::ALL
            .iter()
            .map(|color| (*color, Err("404".to_string())))
            .collect();
        assert!(matches!(
            ColorSets::from_results(results),
            Err(ClientError::NoSpriteSets)
        ));
    }

    #[test]
    fn test_requested_color_preferred() {
        let sets = sets(vec![
            (PlayerColor::Blue, Ok(1)),
            (PlayerColor::Purple, Ok(5)),
            (PlayerColor::Red, Err("404".to_string())),
        ]);
        assert_eq!(*sets.get(PlayerColor::Blue), 1);
        assert!(!sets.contains(PlayerColor::Red));
    }

    #[test]
    fn test_missing_color_falls_back_to_purple() {
        let sets = sets(vec![(PlayerColor::Blue, Ok(1)), (PlayerColor::Purple, Ok(5))]);
        assert_eq!(*sets.get(PlayerColor::Red), 5);
    }

    #[test]
    fn test_missing_purple_falls_back_to_first_loaded() {
        let sets = sets(vec![(PlayerColor::Green, Ok(4)), (PlayerColor::Red, Ok(2))]);
        // BTreeMap order follows the enum: Red comes before Green
        assert_eq!(*sets.get(PlayerColor::Pink), 2);
    }

    #[test]
    fn test_map_keeps_colors() {
        let sets = sets(vec![(PlayerColor::Yellow, Ok(3))]).map(|v| v * 10);
        assert_eq!(sets.colors().collect::<Vec<_>>(), vec![PlayerColor::Yellow]);
        assert_eq!(*sets.get(PlayerColor::Yellow), 30);
    }

    #[test]
    fn test_sprite_path_layout() {
        assert_eq!(
            sprite_path("assets", PlayerColor::Pink, Facing::Left),
            "assets/Pink/neo_pink_left.png"
        );
    }

    #[test]
    fn test_collision_codes_parse() {
        assert_eq!(parse_collision_codes("c.json", "[0, 849, 0]").unwrap(), vec![0, 849, 0]);
        assert!(matches!(
            parse_collision_codes("c.json", "{\"not\": \"an array\"}"),
            Err(ClientError::CollisionData { .. })
        ));
    }
}
