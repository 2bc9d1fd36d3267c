//! Keyboard sampling: one active movement direction plus a few toggles

use log::debug;
use macroquad::prelude::*;
use shared::Facing;

const MAX_CHAT_LEN: usize = 280;

/// Held movement directions in press order. The most recent one wins.
#[derive(Debug, Default, Clone)]
pub struct DirectionTracker {
    pressed: Vec<Facing>,
}

impl DirectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, facing: Facing) {
        self.pressed.retain(|held| *held != facing);
        self.pressed.push(facing);
    }

    pub fn release(&mut self, facing: Facing) {
        self.pressed.retain(|held| *held != facing);
    }

    pub fn is_held(&self, facing: Facing) -> bool {
        self.pressed.contains(&facing)
    }

    pub fn current(&self) -> Option<Facing> {
        self.pressed.last().copied()
    }

    pub fn clear(&mut self) {
        self.pressed.clear();
    }
}

/// Everything the frame loop needs from one input sample.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameInput {
    pub direction: Option<Facing>,
    pub toggle_collisions: bool,
    pub quit: bool,
    /// Chat line the user just submitted.
    pub chat: Option<String>,
}

fn keys_for(facing: Facing) -> [KeyCode; 2] {
    match facing {
        Facing::Up => [KeyCode::Up, KeyCode::W],
        Facing::Down => [KeyCode::Down, KeyCode::S],
        Facing::Left => [KeyCode::Left, KeyCode::A],
        Facing::Right => [KeyCode::Right, KeyCode::D],
    }
}

pub struct InputManager {
    directions: DirectionTracker,
    chat_draft: Option<String>,
    attached: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            directions: DirectionTracker::new(),
            chat_draft: None,
            attached: true,
        }
    }

    /// Text typed into the chat line, while chat input is open.
    pub fn chat_draft(&self) -> Option<&str> {
        self.chat_draft.as_deref()
    }

    pub fn sample(&mut self) -> FrameInput {
        let mut input = FrameInput::default();
        if !self.attached {
            return input;
        }

        if self.chat_draft.is_some() {
            input.chat = self.sample_chat();
            return input;
        }

        for facing in Facing::ALL {
            let down = keys_for(facing).iter().any(|key| is_key_down(*key));
            if down && !self.directions.is_held(facing) {
                self.directions.press(facing);
            } else if !down {
                self.directions.release(facing);
            }
        }
        input.direction = self.directions.current();

        input.toggle_collisions = is_key_pressed(KeyCode::F1);
        input.quit = is_key_pressed(KeyCode::Q);

        if is_key_pressed(KeyCode::Enter) {
            // Discard characters typed before chat opened
            while get_char_pressed().is_some() {}
            self.directions.clear();
            self.chat_draft = Some(String::new());
            input.direction = None;
        }

        input
    }

    fn sample_chat(&mut self) -> Option<String> {
        let draft = self.chat_draft.as_mut()?;

        while let Some(c) = get_char_pressed() {
            if !c.is_control() && draft.chars().count() < MAX_CHAT_LEN {
                draft.push(c);
            }
        }
        if is_key_pressed(KeyCode::Backspace) {
            draft.pop();
        }

        if is_key_pressed(KeyCode::Escape) {
            self.chat_draft = None;
            return None;
        }

        if is_key_pressed(KeyCode::Enter) {
            let text = self.chat_draft.take().unwrap_or_default();
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }

        None
    }

    /// Stops sampling and forgets held keys.
    pub fn release(&mut self) {
        if self.attached {
            debug!("Input released");
        }
        self.attached = false;
        self.directions.clear();
        self.chat_draft = None;
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
