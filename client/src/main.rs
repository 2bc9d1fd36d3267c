use clap::Parser;
use client::assets::Assets;
use client::config::{ClientConfig, LocalIdentity, MapConfig, ReconnectConfig};
use client::entity::{PlayerColor, StripSize};
use client::game::Engine;
use client::input::InputManager;
use client::network::{Transport, TransportSettings};
use client::rendering::{Renderer, Surface};
use client::room::RoomState;
use log::{error, info};
use macroquad::prelude::*;
use shared::ClientMessage;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Room server base URL (http, https, ws or wss)
    #[arg(short = 's', long, env = "TILEROOM_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Room to join
    #[arg(short = 'r', long, default_value = "lobby")]
    room: String,

    /// Room session token, sent as the roomSession.<room> cookie
    #[arg(long, env = "TILEROOM_SESSION")]
    token: Option<String>,

    /// Local player id
    #[arg(long, default_value = "local")]
    id: String,

    /// Display name
    #[arg(short = 'n', long, default_value = "Guest")]
    name: String,

    /// Sprite colour: blue, red, yellow, green, purple or pink
    #[arg(short = 'c', long, default_value = "green")]
    color: String,

    /// Map image
    #[arg(long, default_value = "assets/Map/Office_map_v1_16x16.png")]
    map: String,

    /// JSON array of per-tile collision codes
    #[arg(long, default_value = "assets/Map/collisions.json")]
    collisions: String,

    /// Tile code marking a solid tile
    #[arg(long, default_value = "849")]
    collision_code: i32,

    /// Directory holding the <Colour>/neo_<colour>_<facing>.png strips
    #[arg(long, default_value = "assets")]
    sprites: String,

    /// Share of the window width given to the map
    #[arg(long, default_value = "0.75")]
    view_scale: f32,

    /// Draw solid tiles
    #[arg(long)]
    debug_collisions: bool,

    /// Window width
    #[arg(short = 'w', long, default_value = "1280")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "720")]
    height: i32,
}

impl Args {
    fn into_config(self) -> Result<ClientConfig, Box<dyn std::error::Error>> {
        let defaults = ClientConfig::default();
        let config = ClientConfig {
            server: self.server,
            room_id: self.room,
            session_token: self.token,
            player: LocalIdentity {
                id: self.id,
                name: self.name,
                color: self.color.parse::<PlayerColor>()?,
            },
            map: MapConfig {
                image_path: self.map,
                collision_path: self.collisions,
                collision_code: self.collision_code,
                ..defaults.map
            },
            sprite_dir: self.sprites,
            view_scale_target: self.view_scale,
            debug_collisions: self.debug_collisions,
            reconnect: ReconnectConfig::default(),
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: format!("Tile Room - {}", args.room),
        window_width: args.width,
        window_height: args.height,
        high_dpi: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    if let Err(e) = run(Args::parse()).await {
        error!("Client stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.into_config()?;

    info!("Starting client...");
    info!("Joining room {} at {}", config.room_id, config.socket_url());
    info!("Controls: arrows/WASD to walk, Enter to chat, F1 collisions, Q to quit");

    let runtime = tokio::runtime::Runtime::new()?;
    let guard = runtime.enter();

    let (transport, mut events) = Transport::spawn(TransportSettings::from_config(&config));
    let mut room = RoomState::new(&config.room_id);

    let assets = Assets::load(&config).await?;
    let strip_sizes = assets
        .sprites
        .map(|set| set.map(|texture| StripSize::new(texture.width(), texture.height())));
    let mut engine = Engine::new(
        &config,
        (assets.map.width() as u32, assets.map.height() as u32),
        assets.collision_codes.clone(),
        strip_sizes,
        Surface::from_screen(),
    );

    let mut renderer = Renderer::new(config.debug_collisions);
    let mut input = InputManager::new();

    while engine.is_running() {
        let now = Instant::now();

        while let Ok(event) = events.try_recv() {
            room.apply_event(event);
        }
        engine.sync_room(&room, now);
        engine.resize(Surface::from_screen());

        let frame_input = input.sample();
        if frame_input.quit {
            break;
        }
        if frame_input.toggle_collisions {
            renderer.toggle_collisions();
        }

        let outcome = engine.tick(now, frame_input.direction);
        if let Some(message) = outcome.emit {
            transport.send(message);
        }
        if let Some(text) = frame_input.chat {
            transport.send(ClientMessage::Chat { text });
        }

        renderer.draw_frame(&engine, &assets, &room, input.chat_draft());
        next_frame().await;
    }

    engine.dispose();
    input.release();
    transport.close();

    // Give the connection task a moment to close the socket
    drop(guard);
    runtime.shutdown_timeout(Duration::from_millis(250));
    info!("Client stopped");

    Ok(())
}
