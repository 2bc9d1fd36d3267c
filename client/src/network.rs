//! WebSocket transport: one connection per room, FIFO outbox and reconnect with backoff

use crate::config::{ClientConfig, ReconnectConfig};
use crate::error::ClientError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketWriter = SplitSink<Socket, Message>;
type SocketReader = SplitStream<Socket>;

/// Events delivered from the connection task to the frame loop
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { retry_in: Duration },
    Message(ServerMessage),
}

/// Commands sent from the frame loop to the connection task
#[derive(Debug)]
enum Command {
    Send(ClientMessage),
    Close,
}

/// `min(cap, base * 2^attempt)`, saturating instead of overflowing.
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(cap, |delay| delay.min(cap))
}

/// Exponential reconnect schedule. `attempt` counts consecutive failed
/// connections and only resets on a successful open.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            base: config.base,
            cap: config.cap,
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay the next reconnect will wait.
    pub fn delay(&self) -> Duration {
        backoff_delay(self.base, self.cap, self.attempt)
    }

    /// Records a transient close and returns how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay();
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Outbound queue. Messages submitted while disconnected wait here and are
/// flushed in submission order after the join handshake of the next connection.
#[derive(Debug, Default)]
pub struct Outbox {
    connected: bool,
    queue: VecDeque<ClientMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Returns the message if it can go out right away, otherwise queues it.
    pub fn submit(&mut self, message: ClientMessage) -> Option<ClientMessage> {
        if self.connected {
            Some(message)
        } else {
            self.queue.push_back(message);
            None
        }
    }

    /// Marks the connection open and returns everything to send, in order:
    /// join, state request, then the queued backlog.
    pub fn open(&mut self) -> Vec<ClientMessage> {
        self.connected = true;
        let mut messages = vec![ClientMessage::Join, ClientMessage::StateRequest];
        messages.extend(self.queue.drain(..));
        messages
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    /// Puts messages that failed to send back at the head of the queue.
    /// Handshake messages are dropped; every open sends fresh ones.
    pub fn restore(&mut self, unsent: Vec<ClientMessage>) {
        for message in unsent.into_iter().rev() {
            if !matches!(message, ClientMessage::Join | ClientMessage::StateRequest) {
                self.queue.push_front(message);
            }
        }
    }
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub url: String,
    pub cookie: Option<String>,
    pub reconnect: ReconnectConfig,
}

impl TransportSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            url: config.socket_url(),
            cookie: config.session_cookie(),
            reconnect: config.reconnect,
        }
    }
}

/// Cheap, cloneable handle used by the frame loop. Sends are fire-and-forget.
#[derive(Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<Command>,
    closed: Arc<AtomicBool>,
}

impl TransportHandle {
    pub fn send(&self, message: ClientMessage) {
        if self.is_closed() {
            debug!("Transport closed, dropping {:?}", message);
            return;
        }
        if self.commands.send(Command::Send(message)).is_err() {
            debug!("Connection task gone, dropping message");
        }
    }

    /// Stops the connection for good. Safe to call more than once.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(Command::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct Transport;

impl Transport {
    /// Spawns the connection task on the current tokio runtime.
    pub fn spawn(
        settings: TransportSettings,
    ) -> (TransportHandle, mpsc::UnboundedReceiver<TransportEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_transport(
            settings,
            command_rx,
            event_tx,
            Arc::clone(&closed),
        ));

        (
            TransportHandle {
                commands: command_tx,
                closed,
            },
            event_rx,
        )
    }
}

enum SessionEnd {
    Closed,
    Lost,
}

async fn run_transport(
    settings: TransportSettings,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
) {
    let mut outbox = Outbox::new();
    let mut backoff = Backoff::new(settings.reconnect);

    while !closed.load(Ordering::SeqCst) {
        let attempt = connect_or_close(open_socket(&settings), &mut commands, &mut outbox);
        let Some(opened) = attempt.await else {
            closed.store(true, Ordering::SeqCst);
            break;
        };

        match opened {
            Ok(socket) => {
                backoff.reset();
                info!("Connected to {}", settings.url);
                let _ = events.send(TransportEvent::Connected);

                let (mut writer, mut reader) = socket.split();
                let end = match flush(&mut writer, &mut outbox).await {
                    Ok(()) => {
                        run_session(&mut writer, &mut reader, &mut commands, &mut outbox, &events)
                            .await
                    }
                    Err(e) => {
                        warn!("Failed to flush outbox: {}", e);
                        SessionEnd::Lost
                    }
                };
                outbox.disconnect();

                if let SessionEnd::Closed = end {
                    closed.store(true, Ordering::SeqCst);
                    let _ = writer.close().await;
                    break;
                }
            }
            Err(e) => warn!("Connection to {} failed: {}", settings.url, e),
        }

        if closed.load(Ordering::SeqCst) {
            break;
        }

        let delay = backoff.next_delay();
        warn!(
            "Connection lost, reconnecting in {:?} (attempt {})",
            delay,
            backoff.attempt()
        );
        let _ = events.send(TransportEvent::Disconnected { retry_in: delay });

        if wait_for_retry(delay, &mut commands, &mut outbox).await {
            closed.store(true, Ordering::SeqCst);
        }
    }

    info!(
        "Transport for {} closed ({} messages unsent)",
        settings.url,
        outbox.pending()
    );
}

async fn open_socket(settings: &TransportSettings) -> Result<Socket, ClientError> {
    let mut request = settings.url.as_str().into_client_request()?;
    if let Some(cookie) = &settings.cookie {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| ClientError::Config(format!("invalid session cookie: {}", e)))?;
        request.headers_mut().insert(COOKIE, value);
    }

    let (socket, _response) = connect_async(request).await?;
    Ok(socket)
}

/// Drives a connection attempt while still queueing sends. Returns `None`
/// if the transport was closed before the attempt finished.
async fn connect_or_close<F: Future>(
    connect: F,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    outbox: &mut Outbox,
) -> Option<F::Output> {
    tokio::pin!(connect);

    loop {
        tokio::select! {
            opened = &mut connect => return Some(opened),
            command = commands.recv() => match command {
                Some(Command::Send(message)) => {
                    let _ = outbox.submit(message);
                }
                Some(Command::Close) | None => {
                    debug!("Closed while connecting, abandoning attempt");
                    return None;
                }
            },
        }
    }
}

async fn write_message(
    writer: &mut SocketWriter,
    message: &ClientMessage,
) -> Result<(), ClientError> {
    let json = message.to_json()?;
    writer.send(Message::text(json)).await?;
    Ok(())
}

async fn flush(writer: &mut SocketWriter, outbox: &mut Outbox) -> Result<(), ClientError> {
    let pending = outbox.open();
    for (index, message) in pending.iter().enumerate() {
        if let Err(e) = write_message(writer, message).await {
            outbox.restore(pending[index..].to_vec());
            return Err(e);
        }
    }
    Ok(())
}

async fn run_session(
    writer: &mut SocketWriter,
    reader: &mut SocketReader,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    outbox: &mut Outbox,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> SessionEnd {
    loop {
        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(Message::Text(text))) => match ServerMessage::parse(&text) {
                    Some(message) => {
                        debug!("Received {} frame", message.kind());
                        let _ = events.send(TransportEvent::Message(message));
                    }
                    None => debug!("Dropping malformed frame: {}", text),
                },
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Error receiving frame: {}", e);
                    return SessionEnd::Lost;
                }
            },

            command = commands.recv() => match command {
                Some(Command::Send(message)) => {
                    if let Some(message) = outbox.submit(message) {
                        if let Err(e) = write_message(writer, &message).await {
                            warn!("Failed to send message: {}", e);
                            outbox.restore(vec![message]);
                            return SessionEnd::Lost;
                        }
                    }
                }
                Some(Command::Close) | None => return SessionEnd::Closed,
            },
        }
    }
}

/// Sleeps out the backoff while still queueing sends. Returns true if the
/// transport was closed meanwhile.
async fn wait_for_retry(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    outbox: &mut Outbox,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            command = commands.recv() => match command {
                Some(Command::Send(message)) => {
                    let _ = outbox.submit(message);
                }
                Some(Command::Close) | None => return true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Facing;
    use tokio_test::{assert_pending, assert_ready_eq};

    fn reconnect(base_ms: u64, cap_ms: u64) -> ReconnectConfig {
        ReconnectConfig {
            base: Duration::from_millis(base_ms),
            cap: Duration::from_millis(cap_ms),
        }
    }

    fn chat(text: &str) -> ClientMessage {
        ClientMessage::Chat {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_backoff_delay_formula() {
        let base = Duration::from_millis(1000);
        let cap = Duration::from_millis(16000);
        assert_eq!(backoff_delay(base, cap, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, cap, 3), Duration::from_millis(8000));
        assert_eq!(backoff_delay(base, cap, 4), Duration::from_millis(16000));
        assert_eq!(backoff_delay(base, cap, 10), cap);
        assert_eq!(backoff_delay(base, cap, 64), cap);
    }

    #[test]
    fn test_backoff_after_consecutive_closes() {
        let mut backoff = Backoff::new(reconnect(250, 30_000));
        for closes in 0..12u32 {
            let expected =
                Duration::from_millis(250 * 2u64.pow(closes)).min(Duration::from_secs(30));
            assert_eq!(backoff.attempt(), closes);
            assert_eq!(backoff.delay(), expected);
            assert_eq!(backoff.next_delay(), expected);
        }
    }

    #[test]
    fn test_backoff_resets_on_open() {
        let mut backoff = Backoff::new(reconnect(1000, 16000));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.delay(), Duration::from_millis(4000));

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_outbox_queues_while_disconnected() {
        let mut outbox = Outbox::new();
        assert!(outbox.submit(chat("one")).is_none());
        assert!(outbox.submit(chat("two")).is_none());
        assert_eq!(outbox.pending(), 2);

        let sent = outbox.open();
        assert_eq!(
            sent,
            vec![
                ClientMessage::Join,
                ClientMessage::StateRequest,
                chat("one"),
                chat("two"),
            ]
        );
        assert_eq!(outbox.pending(), 0);
    }

    #[test]
    fn test_outbox_sends_immediately_when_connected() {
        let mut outbox = Outbox::new();
        outbox.open();

        let message = ClientMessage::Move {
            tx: 1,
            ty: 2,
            facing: Facing::Up,
        };
        assert_eq!(outbox.submit(message.clone()), Some(message));
        assert_eq!(outbox.pending(), 0);
    }

    #[test]
    fn test_outbox_handshake_repeats_after_reconnect() {
        let mut outbox = Outbox::new();
        outbox.open();
        outbox.disconnect();
        assert!(outbox.submit(chat("later")).is_none());

        let sent = outbox.open();
        assert_eq!(sent[0], ClientMessage::Join);
        assert_eq!(sent[1], ClientMessage::StateRequest);
        assert_eq!(sent[2], chat("later"));
    }

    #[test]
    fn test_outbox_restore_keeps_order() {
        let mut outbox = Outbox::new();
        outbox.submit(chat("c"));
        outbox.restore(vec![ClientMessage::StateRequest, chat("a"), chat("b")]);

        let sent = outbox.open();
        assert_eq!(&sent[2..], &[chat("a"), chat("b"), chat("c")]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let settings = TransportSettings {
            // Nothing listens on port 9 locally; the task just keeps retrying.
            url: "ws://127.0.0.1:9/ws?room=test".to_string(),
            cookie: None,
            reconnect: reconnect(10, 20),
        };
        let (handle, mut events) = Transport::spawn(settings);

        handle.close();
        handle.close();
        assert!(handle.is_closed());

        // Sends after close are dropped without panicking
        handle.send(chat("ignored"));

        // The task ends and drops its event sender
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while events.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[tokio::test]
    async fn test_close_during_stalled_handshake_stops_task() {
        // Accepts TCP but never answers the WebSocket upgrade
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stalled = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let settings = TransportSettings {
            url: format!("ws://{}/ws?room=test", addr),
            cookie: None,
            reconnect: reconnect(10, 20),
        };
        let (handle, mut events) = Transport::spawn(settings);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.close();

        let received = tokio::time::timeout(Duration::from_secs(2), async {
            let mut received = Vec::new();
            while let Some(event) = events.recv().await {
                received.push(event);
            }
            received
        })
        .await
        .expect("task should stop while the handshake is pending");
        assert!(!received.contains(&TransportEvent::Connected));

        stalled.abort();
    }

    #[tokio::test]
    async fn test_connect_wait_queues_sends_until_close() {
        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let mut outbox = Outbox::new();

        {
            let mut connect = tokio_test::task::spawn(connect_or_close(
                std::future::pending::<()>(),
                &mut command_rx,
                &mut outbox,
            ));
            assert_pending!(connect.poll());

            commands.send(Command::Send(chat("early"))).unwrap();
            assert_pending!(connect.poll());

            commands.send(Command::Close).unwrap();
            assert_ready_eq!(connect.poll(), None);
        }

        assert_eq!(outbox.pending(), 1);
    }

    #[tokio::test]
    async fn test_connect_wait_returns_finished_attempt() {
        let (_commands, mut command_rx) = mpsc::unbounded_channel();
        let mut outbox = Outbox::new();

        let opened = connect_or_close(async { 7 }, &mut command_rx, &mut outbox).await;
        assert_eq!(opened, Some(7));
    }

    #[tokio::test]
    async fn test_backoff_wait_queues_sends_until_close() {
        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let mut outbox = Outbox::new();

        {
            let mut wait = tokio_test::task::spawn(wait_for_retry(
                Duration::from_secs(60),
                &mut command_rx,
                &mut outbox,
            ));
            assert_pending!(wait.poll());

            commands.send(Command::Send(chat("queued"))).unwrap();
            assert_pending!(wait.poll());

            commands.send(Command::Close).unwrap();
            assert_ready_eq!(wait.poll(), true);
        }

        assert_eq!(outbox.pending(), 1);
    }
}
