//! # Tile Room Client Library
//!
//! This library implements the client side of a shared tile room: a top-down
//! office map where every connected occupant is drawn as a walking sprite and
//! can chat with the others. The server owns the roster; the client owns its
//! own movement, collision and rendering.
//!
//! ## Architecture Overview
//!
//! Two halves run side by side and only meet through channels:
//!
//! ### Connection Task
//! A tokio task holds the WebSocket for the room. It announces itself with a
//! `join` and a `state-request` every time a connection opens, flushes any
//! messages queued while it was offline, and reconnects with exponential
//! backoff when the socket drops.
//!
//! ### Frame Loop
//! The macroquad main loop drains transport events into the room store,
//! re-syncs remote actors whenever the roster changes, advances the local
//! actor one step, tests it against the collision grid, and draws the frame.
//! Position updates go back to the server at most ten times a second.
//!
//! ## Module Organization
//!
//! ### Room Module (`room`)
//! Normalized roster, chat log, session info and connection status. Every
//! mutation goes through `RoomState::apply`.
//!
//! ### Game Module (`game`)
//! The `Engine`: per-frame movement, collision, animation, move throttling,
//! roster sync and resize handling.
//!
//! ### Identity Module (`identity`)
//! Decides which roster entry, if any, is the local actor.
//!
//! ### World Module (`world`)
//! Solid tile index and boundary rectangles built from the map's code array.
//!
//! ### Entity Module (`entity`)
//! Actors, walk animation, sprite strips and the feet hitbox.
//!
//! ### Network Module (`network`)
//! The WebSocket connection task, its outbox and the reconnect schedule.
//!
//! ### Rendering Module (`rendering`)
//! DPR-aware viewport geometry and the macroquad renderer.
//!
//! ### Input, Assets, Config, Error
//! Keyboard sampling, asset loading, runtime configuration and the crate
//! error type.
//!
//! ## Usage Example
//!
//! ```ignore
//! use client::*;
//!
//! let room = room::RoomState::new("lobby");
//! let (transport, mut events) =
//!     network::Transport::spawn(network::TransportSettings::from_config(&config));
//!
//! loop {
//!     while let Ok(event) = events.try_recv() {
//!         room.apply_event(event);
//!     }
//!     engine.sync_room(&room, Instant::now());
//!
//!     let input = input_manager.sample();
//!     let outcome = engine.tick(Instant::now(), input.direction);
//!     if let Some(message) = outcome.emit {
//!         transport.send(message);
//!     }
//!
//!     renderer.draw_frame(&engine, &assets, &room, input_manager.chat_draft());
//!     next_frame().await;
//! }
//! ```

pub mod assets;
pub mod config;
pub mod entity;
pub mod error;
pub mod game;
pub mod identity;
pub mod input;
pub mod network;
pub mod rendering;
pub mod room;
pub mod world;
