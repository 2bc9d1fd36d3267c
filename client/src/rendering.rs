use crate::assets::Assets;
use crate::entity::Drawable;
use crate::game::Engine;
use crate::room::{ConnectionStatus, RoomState};
use log::info;
use macroquad::prelude::*;

/// Fallback CSS size when the window reports nothing yet.
const FALLBACK_SIZE: (f32, f32) = (800.0, 600.0);
/// Sprite strips are drawn at one twelfth of a tile per source pixel.
const SPRITE_SCALE_DIVISOR: f32 = 12.0;
const CHAT_LINES: usize = 18;
const OCCUPANT_LINES: usize = 12;

/// What the drawing surface currently looks like.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    /// Size of the element hosting the canvas, when known.
    pub container: Option<(f32, f32)>,
    pub window: (f32, f32),
    pub dpr: f32,
    /// Top-left corner of the canvas in window coordinates.
    pub origin: (f32, f32),
}

impl Surface {
    pub fn window(width: f32, height: f32) -> Self {
        Self {
            container: None,
            window: (width, height),
            dpr: 1.0,
            origin: (0.0, 0.0),
        }
    }

    pub fn from_screen() -> Self {
        Self {
            container: None,
            window: (screen_width(), screen_height()),
            dpr: screen_dpi_scale(),
            origin: (0.0, 0.0),
        }
    }
}

/// DPR-aware canvas geometry and coordinate transforms. All drawing and
/// hit-testing happens in CSS pixels.
#[derive(Debug, Clone)]
pub struct Viewport {
    map_width: u32,
    map_height: u32,
    view_scale_target: f32,
    surface: Surface,
    css_width: f32,
    css_height: f32,
    dpr: f32,
}

impl Viewport {
    pub fn new(map_width: u32, map_height: u32, view_scale_target: f32, surface: Surface) -> Self {
        let mut viewport = Self {
            map_width: map_width.max(1),
            map_height: map_height.max(1),
            view_scale_target: view_scale_target.clamp(0.2, 1.0),
            surface,
            css_width: 0.0,
            css_height: 0.0,
            dpr: 1.0,
        };
        viewport.size_to(surface);
        viewport
    }

    pub fn size_to(&mut self, surface: Surface) {
        self.surface = surface;

        let (container_w, container_h) = surface.container.unwrap_or((0.0, 0.0));
        let (window_w, window_h) = surface.window;

        let mut base_w = if container_w > 0.0 {
            container_w
        } else {
            (window_w * self.view_scale_target).floor()
        };
        let mut base_h = if container_h > 0.0 {
            container_h
        } else {
            window_h
        };
        if base_w <= 0.0 || base_h <= 0.0 {
            (base_w, base_h) = FALLBACK_SIZE;
        }

        let aspect = self.aspect();
        let mut css_w = base_w;
        let mut css_h = (base_w / aspect).floor();
        if css_h > base_h {
            css_h = base_h;
            css_w = (base_h * aspect).floor();
        }

        self.css_width = css_w;
        self.css_height = css_h;
        self.dpr = surface.dpr.max(1.0);

        let (backing_w, backing_h) = self.backing_size();
        info!(
            "Viewport sized: css {}x{}, dpr {}, backing {}x{}",
            css_w, css_h, self.dpr, backing_w, backing_h
        );
    }

    pub fn set_map_size(&mut self, map_width: u32, map_height: u32) {
        self.map_width = map_width.max(1);
        self.map_height = map_height.max(1);
        self.size_to(self.surface);
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn map_size(&self) -> (u32, u32) {
        (self.map_width, self.map_height)
    }

    pub fn aspect(&self) -> f32 {
        self.map_width as f32 / self.map_height as f32
    }

    pub fn css_size(&self) -> (f32, f32) {
        (self.css_width, self.css_height)
    }

    pub fn dpr(&self) -> f32 {
        self.dpr
    }

    /// Device-pixel size of the backing store.
    pub fn backing_size(&self) -> (u32, u32) {
        (
            (self.css_width * self.dpr).floor() as u32,
            (self.css_height * self.dpr).floor() as u32,
        )
    }

    pub fn origin(&self) -> (f32, f32) {
        self.surface.origin
    }

    pub fn tile_size(&self) -> f32 {
        self.css_width / self.map_width as f32
    }

    pub fn sprite_scale(&self) -> f32 {
        self.tile_size() / SPRITE_SCALE_DIVISOR
    }

    pub fn px_to_tile(&self, x: f32, y: f32) -> (i32, i32) {
        let ts = self.tile_size();
        ((x / ts).floor() as i32, (y / ts).floor() as i32)
    }

    pub fn tile_to_px(&self, tx: f32, ty: f32) -> (f32, f32) {
        let ts = self.tile_size();
        (tx * ts, ty * ts)
    }

    pub fn tile_center_px(&self, tx: f32, ty: f32) -> (f32, f32) {
        let ts = self.tile_size();
        (tx * ts + ts / 2.0, ty * ts + ts / 2.0)
    }

    pub fn client_to_world(&self, client_x: f32, client_y: f32) -> (f32, f32) {
        let (ox, oy) = self.surface.origin;
        (client_x - ox, client_y - oy)
    }
}

pub struct Renderer {
    show_collisions: bool,
}

impl Renderer {
    pub fn new(show_collisions: bool) -> Self {
        Renderer { show_collisions }
    }

    pub fn toggle_collisions(&mut self) {
        self.show_collisions = !self.show_collisions;
        info!("Collision overlay: {}", self.show_collisions);
    }

    pub fn draw_frame(
        &self,
        engine: &Engine,
        assets: &Assets,
        room: &RoomState,
        chat_draft: Option<&str>,
    ) {
        let viewport = engine.viewport();
        let origin = viewport.origin();
        let (css_w, css_h) = viewport.css_size();

        clear_background(Color::from_rgba(26, 26, 26, 255));

        draw_texture_ex(
            &assets.map,
            origin.0,
            origin.1,
            WHITE,
            DrawTextureParams {
                dest_size: Some(vec2(css_w, css_h)),
                ..Default::default()
            },
        );

        if self.show_collisions {
            self.draw_collisions(engine, origin);
        }

        for actor in engine.remotes().values() {
            self.draw_actor(actor, assets, origin);
        }
        self.draw_actor(engine.local(), assets, origin);

        self.draw_hud(room, chat_draft, origin.0 + css_w + 12.0, origin.1);
    }

    fn draw_collisions(&self, engine: &Engine, origin: (f32, f32)) {
        let fill = Color::new(1.0, 0.0, 0.0, 0.25);
        for boundary in engine.world().boundaries() {
            draw_rectangle(
                origin.0 + boundary.left,
                origin.1 + boundary.top,
                boundary.width(),
                boundary.height(),
                fill,
            );
        }
    }

    fn draw_actor(&self, actor: &impl Drawable, assets: &Assets, origin: (f32, f32)) {
        let frame = actor.sprite_frame();
        let strip = assets.sprites.get(frame.color).get(frame.facing);

        draw_texture_ex(
            strip,
            origin.0 + frame.dest.left,
            origin.1 + frame.dest.top,
            WHITE,
            DrawTextureParams {
                dest_size: Some(vec2(frame.dest.width(), frame.dest.height())),
                source: Some(Rect::new(
                    frame.source.left,
                    frame.source.top,
                    frame.source.width(),
                    frame.source.height(),
                )),
                ..Default::default()
            },
        );

        let label_color = if frame.highlighted { YELLOW } else { WHITE };
        let dims = measure_text(frame.label, None, 14, 1.0);
        let center_x = origin.0 + frame.dest.left + frame.dest.width() / 2.0;
        draw_text(
            frame.label,
            (center_x - dims.width / 2.0).round(),
            origin.1 + frame.dest.top - 6.0,
            14.0,
            label_color,
        );
    }

    fn draw_hud(&self, room: &RoomState, chat_draft: Option<&str>, x: f32, y: f32) {
        let (status, status_color) = match room.status() {
            ConnectionStatus::Connected => ("connected", GREEN),
            ConnectionStatus::Connecting => ("connecting", YELLOW),
            ConnectionStatus::Reconnecting { .. } => ("reconnecting", RED),
        };
        draw_rectangle(x, y + 6.0, 8.0, 8.0, status_color);
        draw_text(status, x + 14.0, y + 14.0, 16.0, WHITE);

        let room_line = format!(
            "room {}  |  {} here",
            room.room_id().unwrap_or("?"),
            room.roster().len()
        );
        draw_text(&room_line, x, y + 34.0, 16.0, WHITE);

        let mut line_y = y + 54.0;
        let names = room.occupant_names();
        for name in names.iter().take(OCCUPANT_LINES) {
            draw_text(name, x + 8.0, line_y, 14.0, LIGHTGRAY);
            line_y += 16.0;
        }
        if names.len() > OCCUPANT_LINES {
            let more = format!("+{} more", names.len() - OCCUPANT_LINES);
            draw_text(&more, x + 8.0, line_y, 14.0, GRAY);
            line_y += 16.0;
        }
        line_y += 4.0;
        if let Some(error) = room.last_error() {
            draw_text(error, x, line_y, 14.0, RED);
            line_y += 20.0;
        }

        let input_line = match chat_draft {
            Some(draft) => format!("> {}_", draft),
            None => "Enter to chat, F1 collisions, Q to quit".to_string(),
        };
        draw_text(&input_line, x, line_y, 14.0, LIGHTGRAY);
        line_y += 22.0;

        for message in room.chat().iter().take(CHAT_LINES) {
            let line = format!("{}: {}", message.sender_name, message.text);
            draw_text(&line, x, line_y, 14.0, WHITE);
            line_y += 18.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_viewport_preserves_aspect_ratio() {
        let viewport = Viewport::new(75, 50, 0.75, Surface::window(1600.0, 900.0));
        assert_eq!(viewport.css_size(), (1200.0, 800.0));
        assert_approx_eq!(viewport.tile_size(), 16.0);
        assert_approx_eq!(viewport.sprite_scale(), 16.0 / 12.0);
    }

    #[test]
    fn test_viewport_bounded_by_height() {
        let viewport = Viewport::new(75, 50, 1.0, Surface::window(1600.0, 400.0));
        assert_eq!(viewport.css_size(), (600.0, 400.0));
        assert_approx_eq!(viewport.tile_size(), 8.0);
    }

    #[test]
    fn test_viewport_prefers_container() {
        let surface = Surface {
            container: Some((750.0, 1000.0)),
            ..Surface::window(1600.0, 900.0)
        };
        let viewport = Viewport::new(75, 50, 0.75, surface);
        assert_eq!(viewport.css_size(), (750.0, 500.0));
    }

    #[test]
    fn test_viewport_falls_back_on_empty_surface() {
        let viewport = Viewport::new(80, 40, 0.75, Surface::window(0.0, 0.0));
        assert_eq!(viewport.css_size(), (800.0, 400.0));
    }

    #[test]
    fn test_backing_store_scales_with_dpr() {
        let surface = Surface {
            dpr: 2.0,
            ..Surface::window(1600.0, 900.0)
        };
        let viewport = Viewport::new(75, 50, 0.75, surface);
        assert_eq!(viewport.css_size(), (1200.0, 800.0));
        assert_eq!(viewport.backing_size(), (2400, 1600));
        // Tile size stays in CSS pixels
        assert_approx_eq!(viewport.tile_size(), 16.0);
    }

    #[test]
    fn test_dpr_below_one_is_clamped() {
        let surface = Surface {
            dpr: 0.5,
            ..Surface::window(1600.0, 900.0)
        };
        let viewport = Viewport::new(75, 50, 0.75, surface);
        assert_eq!(viewport.dpr(), 1.0);
    }

    #[test]
    fn test_tile_size_follows_map_size() {
        let mut viewport = Viewport::new(75, 50, 0.75, Surface::window(1600.0, 900.0));
        viewport.set_map_size(60, 40);
        assert_eq!(viewport.map_size(), (60, 40));
        assert_approx_eq!(viewport.tile_size(), 20.0);
    }

    #[test]
    fn test_coordinate_conversions() {
        let surface = Surface {
            origin: (10.0, 20.0),
            ..Surface::window(1600.0, 900.0)
        };
        let viewport = Viewport::new(75, 50, 0.75, surface);

        assert_eq!(viewport.px_to_tile(33.0, 15.9), (2, 0));
        assert_eq!(viewport.tile_to_px(3.0, 4.0), (48.0, 64.0));
        assert_eq!(viewport.tile_center_px(3.0, 4.0), (56.0, 72.0));
        assert_eq!(viewport.client_to_world(110.0, 220.0), (100.0, 200.0));
    }
}
