//! Fanout Notification Channel
//!
//! Client for a fanout pub/sub server speaking the plain line protocol:
//!
//! ```text
//! client -> server   subscribe <channel>\n
//! client -> server   announce <channel> <message>\n
//! server -> client   <channel>!<message>\n
//! ```
//!
//! A background task owns the TCP connection. It reconnects after failures
//! and replays every subscription on each new connection. Announcements are
//! only accepted while connected; anything still queued when a connection
//! drops is discarded rather than replayed later.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    notification::{MessageCallback, NotificationChannel},
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delay between reconnection attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

type Subscriptions = Arc<RwLock<HashMap<String, Vec<MessageCallback>>>>;

#[derive(Debug)]
enum Command {
    Subscribe(String),
    Announce { channel: String, message: String },
}

impl Command {
    fn to_line(&self) -> String {
        match self {
            Command::Subscribe(channel) => format!("subscribe {}\n", channel),
            Command::Announce { channel, message } => {
                format!("announce {} {}\n", channel, message)
            }
        }
    }
}

/// Desktop notification channel backed by a fanout server
pub struct FanoutChannel {
    address: String,
    commands: mpsc::UnboundedSender<Command>,
    subscriptions: Subscriptions,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl FanoutChannel {
    /// Start the connection task for `address` (`host:port`).
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. Must be called from within a tokio runtime.
    pub fn connect(address: impl Into<String>) -> Self {
        Self::with_reconnect_delay(address, DEFAULT_RECONNECT_DELAY)
    }

    pub fn with_reconnect_delay(address: impl Into<String>, reconnect_delay: Duration) -> Self {
        let address = address.into();
        let (commands, rx) = mpsc::unbounded_channel();
        let subscriptions: Subscriptions = Arc::new(RwLock::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(connection_loop(
            address.clone(),
            reconnect_delay,
            rx,
            subscriptions.clone(),
            connected.clone(),
        ));

        Self {
            address,
            commands,
            subscriptions,
            connected,
            task,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether a connection is up and its subscriptions have been replayed
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| BridgeError::NotAvailable("Fanout connection task stopped".to_string()))
    }
}

impl Drop for FanoutChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl NotificationChannel for FanoutChannel {
    async fn subscribe(&self, channel: &str, on_message: MessageCallback) -> Result<()> {
        validate_token("channel", channel)?;

        let is_new = {
            let mut subscriptions = self.subscriptions.write().await;
            let callbacks = subscriptions.entry(channel.to_string()).or_default();
            callbacks.push(on_message);
            callbacks.len() == 1
        };

        if is_new {
            self.send(Command::Subscribe(channel.to_string()))?;
        }
        debug!(channel, "Subscribed to fanout channel");
        Ok(())
    }

    async fn announce(&self, channel: &str, message: &str) -> Result<()> {
        validate_token("channel", channel)?;
        if message.contains('\n') {
            return Err(BridgeError::OperationFailed(
                "Fanout messages cannot contain newlines".to_string(),
            ));
        }
        if !self.is_connected() {
            return Err(BridgeError::Connection(format!(
                "Not connected to fanout server {}",
                self.address
            )));
        }

        self.send(Command::Announce {
            channel: channel.to_string(),
            message: message.to_string(),
        })
    }
}

fn validate_token(what: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(|c: char| c.is_whitespace() || c == '!') {
        return Err(BridgeError::OperationFailed(format!(
            "Invalid fanout {}: {:?}",
            what, value
        )));
    }
    Ok(())
}

// ============================================================================
// Connection Task
// ============================================================================

async fn connection_loop(
    address: String,
    reconnect_delay: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    subscriptions: Subscriptions,
    connected: Arc<AtomicBool>,
) {
    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                info!(address = %address, "Connected to fanout server");
                let served = serve(stream, &mut commands, &subscriptions, &connected).await;
                connected.store(false, Ordering::SeqCst);
                match served {
                    Ok(Served::Closed) => return,
                    Ok(Served::Disconnected) => {
                        warn!(address = %address, "Fanout server closed the connection")
                    }
                    Err(e) => warn!(address = %address, error = %e, "Fanout connection failed"),
                }
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Cannot connect to fanout server");
            }
        }

        tokio::time::sleep(reconnect_delay).await;
    }
}

enum Served {
    /// Every `FanoutChannel` handle is gone
    Closed,
    /// The server hung up
    Disconnected,
}

async fn serve(
    stream: TcpStream,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    subscriptions: &Subscriptions,
    connected: &AtomicBool,
) -> std::io::Result<Served> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Left over from the previous connection. Subscriptions are replayed
    // from the map below; announcements are stale.
    let mut discarded = 0;
    while let Ok(command) = commands.try_recv() {
        if matches!(command, Command::Announce { .. }) {
            discarded += 1;
        }
    }
    if discarded > 0 {
        debug!(discarded, "Dropped announcements queued before reconnect");
    }

    let mut sent = HashSet::new();
    let channels: Vec<String> = subscriptions.read().await.keys().cloned().collect();
    for channel in channels {
        let command = Command::Subscribe(channel.clone());
        writer.write_all(command.to_line().as_bytes()).await?;
        sent.insert(channel);
    }
    connected.store(true, Ordering::SeqCst);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    return Ok(Served::Closed);
                };
                if let Command::Subscribe(channel) = &command {
                    if !sent.insert(channel.clone()) {
                        continue;
                    }
                }
                writer.write_all(command.to_line().as_bytes()).await?;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => dispatch(&line, subscriptions).await,
                    None => return Ok(Served::Disconnected),
                }
            }
        }
    }
}

async fn dispatch(line: &str, subscriptions: &Subscriptions) {
    let Some((channel, message)) = line.trim_end_matches('\r').split_once('!') else {
        debug!(line, "Ignoring malformed fanout line");
        return;
    };

    let callbacks = match subscriptions.read().await.get(channel) {
        Some(callbacks) => callbacks.clone(),
        None => return,
    };

    for callback in callbacks {
        tokio::spawn(callback(channel.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        (listener, address)
    }

    fn recording_callback() -> (MessageCallback, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: MessageCallback = Arc::new(move |channel, message| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((channel, message));
            }
            .boxed()
        });
        (callback, rx)
    }

    async fn wait_connected(channel: &FanoutChannel) {
        tokio::time::timeout(TIMEOUT, async {
            while !channel.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fanout channel never connected");
    }

    async fn next_line<R>(lines: &mut tokio::io::Lines<BufReader<R>>) -> String
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        tokio::time::timeout(TIMEOUT, lines.next_line())
            .await
            .expect("timed out waiting for client line")
            .unwrap()
            .expect("client closed the connection")
    }

    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let (listener, address) = listener().await;
        let channel = FanoutChannel::connect(address);
        let (callback, mut received) = recording_callback();

        channel.subscribe("ab01", callback).await.unwrap();

        let (socket, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = socket.into_split();
        let mut lines = BufReader::new(reader).lines();

        assert_eq!(next_line(&mut lines).await, "subscribe ab01");

        writer.write_all(b"other!1\nab01!1\n").await.unwrap();

        let (ch, msg) = tokio::time::timeout(TIMEOUT, received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((ch.as_str(), msg.as_str()), ("ab01", "1"));
    }

    #[tokio::test]
    async fn test_announce_line_format() {
        let (listener, address) = listener().await;
        let channel = FanoutChannel::connect(address);

        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        wait_connected(&channel).await;

        channel.announce("deadbeef", "1").await.unwrap();
        assert_eq!(next_line(&mut lines).await, "announce deadbeef 1");
    }

    #[tokio::test]
    async fn test_resubscribes_after_reconnect() {
        let (listener, address) = listener().await;
        let channel = FanoutChannel::with_reconnect_delay(address, Duration::from_millis(50));
        let (callback, _received) = recording_callback();
        channel.subscribe("ab01", callback).await.unwrap();

        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        assert_eq!(next_line(&mut lines).await, "subscribe ab01");
        drop(lines);

        let (socket, _) = tokio::time::timeout(TIMEOUT, listener.accept())
            .await
            .unwrap()
            .unwrap();
        let mut lines = BufReader::new(socket).lines();
        assert_eq!(next_line(&mut lines).await, "subscribe ab01");
    }

    #[tokio::test]
    async fn test_second_callback_does_not_resend_subscribe() {
        let (listener, address) = listener().await;
        let channel = FanoutChannel::connect(address);
        let (first, _rx1) = recording_callback();
        let (second, _rx2) = recording_callback();

        channel.subscribe("ab01", first).await.unwrap();
        channel.subscribe("ab01", second).await.unwrap();

        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        assert_eq!(next_line(&mut lines).await, "subscribe ab01");

        wait_connected(&channel).await;
        channel.announce("ab01", "1").await.unwrap();
        assert_eq!(next_line(&mut lines).await, "announce ab01 1");
    }

    #[tokio::test]
    async fn test_announce_during_outage_fails_and_is_not_replayed() {
        let (listener, address) = listener().await;
        drop(listener);

        let channel =
            FanoutChannel::with_reconnect_delay(address.clone(), Duration::from_millis(50));
        let (callback, _received) = recording_callback();
        channel.subscribe("ab01", callback).await.unwrap();

        for _ in 0..20 {
            let result = channel.announce("ab01", "1").await;
            assert!(matches!(result, Err(BridgeError::Connection(_))));
        }

        let listener = TcpListener::bind(&address).await.unwrap();
        let (socket, _) = tokio::time::timeout(TIMEOUT, listener.accept())
            .await
            .unwrap()
            .unwrap();
        let mut lines = BufReader::new(socket).lines();
        assert_eq!(next_line(&mut lines).await, "subscribe ab01");

        wait_connected(&channel).await;
        channel.announce("ab01", "2").await.unwrap();
        assert_eq!(next_line(&mut lines).await, "announce ab01 2");
    }

    #[tokio::test]
    async fn test_rejects_invalid_tokens() {
        let channel = FanoutChannel::connect("127.0.0.1:9");
        let (callback, _rx) = recording_callback();

        assert!(channel.announce("ab01", "two\nlines").await.is_err());
        assert!(channel.announce("", "1").await.is_err());
        assert!(channel.subscribe("has space", callback).await.is_err());
    }
}
