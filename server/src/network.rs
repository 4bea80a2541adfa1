//! Server network layer: accept loop, per-session receive loops and dispatch

use crate::command::{self, Command};
use crate::config::{Framing, ServerConfig};
use crate::error::ServerError;
use crate::moderation::Policy;
use crate::registry::{Registry, SharedRegistry};
use crate::scheduler::schedule_broadcast;
use crate::session::{Session, SessionId};
use chat_shared::{
    chat_line, left_notice, nick_changed, INVALID_COMMAND, QUIT_KEYWORD, READ_CHUNK_SIZE, WELCOME,
};
use log::{debug, error, info, warn};
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

/// Consecutive failed accepts after which the listener is considered broken
const MAX_ACCEPT_FAILURES: u32 = 100;
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);
/// How long a closing session's writer may take to flush before it is aborted
const WRITER_GRACE: Duration = Duration::from_secs(5);

/// Whether a session's receive loop keeps going after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// Cuts an inbound byte stream into messages according to a [`Framing`]
pub struct MessageReader<R> {
    inner: BufReader<R>,
    framing: Framing,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R, framing: Framing) -> Self {
        Self {
            inner: BufReader::new(reader),
            framing,
        }
    }

    /// Next message with trailing CR/LF removed, or None once the peer closed
    pub async fn next_message(&mut self) -> Result<Option<String>, ServerError> {
        match self.framing {
            Framing::Chunk => {
                let mut buffer = [0u8; READ_CHUNK_SIZE];
                let len = self.inner.read(&mut buffer).await?;
                if len == 0 {
                    return Ok(None);
                }
                let text = std::str::from_utf8(&buffer[..len])?;
                Ok(Some(strip_line_ending(text).to_string()))
            }
            Framing::Line => {
                let mut line = String::new();
                if self.inner.read_line(&mut line).await? == 0 {
                    return Ok(None);
                }
                Ok(Some(strip_line_ending(&line).to_string()))
            }
        }
    }
}

fn strip_line_ending(text: &str) -> &str {
    text.trim_end_matches(['\r', '\n'])
}

/// Drains a session's outbound queue into its socket, one `\n`-terminated
/// message at a time. Shuts the socket down once every sender is dropped.
async fn write_outbound<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::Receiver<String>,
) -> io::Result<()> {
    while let Some(message) = outbound.recv().await {
        writer.write_all(message.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

/// Decides how the accept loop reacts to a failed `accept`
///
/// Dropped handshakes are skipped at once. Anything else, such as running
/// out of file descriptors, is retried after a short pause; only a long run
/// of failures with no successful accept in between stops the server.
#[derive(Debug, Default)]
struct AcceptBackoff {
    consecutive_failures: u32,
}

impl AcceptBackoff {
    fn on_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Pause before the next accept, or the error that ends the loop
    fn on_error(&mut self, e: io::Error) -> Result<Duration, ServerError> {
        if matches!(
            e.kind(),
            ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
        ) {
            warn!("Connection dropped before accept: {}", e);
            return Ok(Duration::ZERO);
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= MAX_ACCEPT_FAILURES {
            error!(
                "Accept failed {} times in a row, giving up: {}",
                self.consecutive_failures, e
            );
            return Err(ServerError::Accept(e));
        }
        error!("Accept failed, retrying: {}", e);
        Ok(ACCEPT_RETRY_DELAY)
    }
}

/// Per-connection settings copied into every connection task
#[derive(Debug, Clone, Copy)]
struct ConnectionSettings {
    policy: Policy,
    framing: Framing,
    queue_limit: usize,
}

/// Main server owning the listener and the registry of live sessions
pub struct Server {
    listener: TcpListener,
    registry: SharedRegistry,
    settings: ConnectionSettings,
}

impl Server {
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            registry: Registry::shared(config.ban_duration_hours),
            settings: ConnectionSettings {
                policy: Policy::from_config(config),
                framing: config.framing,
                queue_limit: config.outbound_queue_limit.max(1),
            },
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> SharedRegistry {
        SharedRegistry::clone(&self.registry)
    }

    /// Accepts connections until the listener keeps failing, spawning one
    /// task per client. Client failures never reach this loop.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut backoff = AcceptBackoff::default();
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    backoff.on_success();
                    let registry = SharedRegistry::clone(&self.registry);
                    let settings = self.settings;
                    tokio::spawn(async move {
                        handle_connection(stream, addr, registry, settings).await;
                    });
                }
                Err(e) => {
                    let pause = backoff.on_error(e)?;
                    if !pause.is_zero() {
                        sleep(pause).await;
                    }
                }
            }
        }
    }
}

/// Tells every session goodbye and closes all transports
pub async fn shutdown(registry: &SharedRegistry) {
    let closed = registry.write().await.close_all(QUIT_KEYWORD);
    info!("Closed {} sessions", closed);
}

/// Drives one client from accept to close
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: SharedRegistry,
    settings: ConnectionSettings,
) {
    info!("New connection from {}", addr);
    let (read_half, write_half) = stream.into_split();
    let (outbound, outbound_rx) = mpsc::channel(settings.queue_limit);
    let mut writer = tokio::spawn(write_outbound(write_half, outbound_rx));

    // Welcome is queued under the same lock as registration so that it
    // precedes every broadcast the session can see.
    let (id, overflow) = {
        let mut registry = registry.write().await;
        let id = registry.register(addr, outbound);
        registry.send_to(id, WELCOME);
        let overflow = registry.get(id).map(Session::overflow_signal);
        (id, overflow.unwrap_or_default())
    };

    let mut reader = MessageReader::new(read_half, settings.framing);
    loop {
        let next = tokio::select! {
            next = reader.next_message() => next,
            _ = overflow.notified() => {
                warn!("{} is not reading its messages, disconnecting", addr);
                break;
            }
        };
        match next {
            Ok(Some(message)) => {
                if message.trim().is_empty() {
                    continue;
                }
                if dispatch(&registry, &settings.policy, id, &message).await == Flow::Close {
                    break;
                }
            }
            Ok(None) => {
                debug!("Peer {} closed the connection", addr);
                break;
            }
            Err(e) => {
                warn!("Read from {} failed: {}", addr, e);
                break;
            }
        }
    }

    disconnect(&registry, id).await;
    drop(reader);

    match timeout(WRITER_GRACE, &mut writer).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => debug!("Writer for {} ended with error: {}", addr, e),
        Ok(Err(e)) => error!("Writer task for {} panicked: {}", addr, e),
        Err(_) => {
            warn!("Writer for {} did not drain in time, dropping the socket", addr);
            writer.abort();
        }
    }
    info!("Connection from {} closed", addr);
}

/// Runs the close sequence at most once per session: remaining sessions get
/// the departure notice, the session leaves the registry and is told `quit`.
/// Dropping the session afterwards ends its writer, which closes the socket.
async fn disconnect(registry: &SharedRegistry, id: SessionId) {
    let mut registry = registry.write().await;
    let Some(session) = registry.unregister(id) else {
        return;
    };
    registry.broadcast(&left_notice(&session.nickname), &[id]);
    session.send(QUIT_KEYWORD);
}

async fn dispatch(registry: &SharedRegistry, policy: &Policy, id: SessionId, message: &str) -> Flow {
    match command::parse(message) {
        Command::Quit => return Flow::Close,

        Command::SetNick(nickname) => {
            let mut registry = registry.write().await;
            if let Some(session) = registry.get_mut(id) {
                info!("{} is now known as {}", session, nickname);
                session.nickname = nickname;
                session.send(nick_changed(&session.nickname));
            }
        }

        Command::PrivateMessage { target, body } => {
            let registry = registry.read().await;
            if let Err(e) = registry.send_private(id, &target, &body) {
                debug!("Private message from {} not delivered: {:?}", id, e);
                registry.send_to(id, e.to_string());
            }
        }

        Command::Complaint(target) => {
            let mut registry = registry.write().await;
            if let Err(e) = registry.complain(&target, policy.complaint_threshold, Instant::now()) {
                registry.send_to(id, e.to_string());
            }
        }

        Command::Delay { minutes, body } => {
            let line = {
                let registry = registry.read().await;
                match registry.get(id) {
                    Some(session) => chat_line(&session.nickname, &body),
                    None => return Flow::Close,
                }
            };
            match schedule_broadcast(SharedRegistry::clone(registry), minutes, line) {
                Ok(_) => info!("Session {} scheduled a broadcast in {} minutes", id, minutes),
                Err(e) => {
                    debug!("Session {}: {}", id, e);
                    registry.read().await.send_to(id, INVALID_COMMAND);
                }
            }
        }

        Command::PlainText(text) => {
            let mut registry = registry.write().await;
            let now = Instant::now();
            let line = {
                let Some(session) = registry.get_mut(id) else {
                    return Flow::Close;
                };
                let decision = policy.check_access(session, now);
                for notice in decision.notices {
                    session.send(notice);
                }
                if !decision.allowed {
                    return Flow::Continue;
                }
                session.record_message(now);
                chat_line(&session.nickname, &text)
            };
            registry.broadcast(&line, &[]);
        }

        Command::Invalid(e) => {
            debug!("Session {} sent an invalid command: {}", id, e);
            let registry = registry.read().await;
            registry.send_to(id, INVALID_COMMAND);
            if let Some(hint) = e.usage_hint() {
                registry.send_to(id, hint);
            }
        }
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_chunk_framing_one_read_is_one_message() {
        let mock = Builder::new()
            .read(b"hello\r\n")
            .read(b"two\nlines")
            .build();
        let mut reader = MessageReader::new(mock, Framing::Chunk);

        assert_eq!(reader.next_message().await.unwrap().unwrap(), "hello");
        assert_eq!(reader.next_message().await.unwrap().unwrap(), "two\nlines");
        assert!(reader.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chunk_framing_caps_read_size() {
        let long = "x".repeat(READ_CHUNK_SIZE + 10);
        let mock = Builder::new().read(long.as_bytes()).build();
        let mut reader = MessageReader::new(mock, Framing::Chunk);

        let first = reader.next_message().await.unwrap().unwrap();
        assert_eq!(first.len(), READ_CHUNK_SIZE);
        let second = reader.next_message().await.unwrap().unwrap();
        assert_eq!(second.len(), 10);
    }

    #[tokio::test]
    async fn test_chunk_framing_rejects_invalid_utf8() {
        let mock = Builder::new().read(&[0x68, 0xff, 0x69]).build();
        let mut reader = MessageReader::new(mock, Framing::Chunk);

        assert!(matches!(
            reader.next_message().await,
            Err(ServerError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_line_framing_splits_on_newline() {
        let mock = Builder::new()
            .read(b"one\ntw")
            .read(b"o\r\nthree")
            .build();
        let mut reader = MessageReader::new(mock, Framing::Line);

        assert_eq!(reader.next_message().await.unwrap().unwrap(), "one");
        assert_eq!(reader.next_message().await.unwrap().unwrap(), "two");
        assert_eq!(reader.next_message().await.unwrap().unwrap(), "three");
        assert!(reader.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writer_terminates_each_message() {
        let mock = Builder::new().write(b"hi").write(b"\n").build();
        let (tx, rx) = mpsc::channel(4);
        tx.try_send("hi".to_string()).unwrap();
        drop(tx);

        write_outbound(mock, rx).await.unwrap();
    }

    #[test]
    fn test_accept_backoff_retries_resource_exhaustion() {
        let mut backoff = AcceptBackoff::default();

        // EMFILE: too many open files
        let pause = backoff.on_error(io::Error::from_raw_os_error(24)).unwrap();
        assert_eq!(pause, ACCEPT_RETRY_DELAY);

        let aborted = io::Error::from(ErrorKind::ConnectionAborted);
        assert_eq!(backoff.on_error(aborted).unwrap(), Duration::ZERO);
        assert_eq!(backoff.consecutive_failures, 1);
    }

    #[test]
    fn test_accept_backoff_gives_up_on_persistent_failure() {
        let mut backoff = AcceptBackoff::default();
        for _ in 1..MAX_ACCEPT_FAILURES {
            assert!(backoff.on_error(io::Error::from_raw_os_error(24)).is_ok());
        }

        let err = backoff.on_error(io::Error::from_raw_os_error(24)).unwrap_err();
        assert!(matches!(err, ServerError::Accept(_)));
    }

    #[test]
    fn test_accept_backoff_resets_after_success() {
        let mut backoff = AcceptBackoff::default();
        for _ in 1..MAX_ACCEPT_FAILURES {
            backoff.on_error(io::Error::from_raw_os_error(24)).unwrap();
        }

        backoff.on_success();

        assert!(backoff.on_error(io::Error::from_raw_os_error(24)).is_ok());
        assert_eq!(backoff.consecutive_failures, 1);
    }

    fn register(registry: &mut Registry, port: u16) -> (SessionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(64);
        (registry.register(SocketAddr::from(([127, 0, 0, 1], port)), tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut received = Vec::new();
        while let Ok(message) = rx.try_recv() {
            received.push(message);
        }
        received
    }

    #[tokio::test]
    async fn test_disconnect_runs_once() {
        let registry = Registry::shared(4);
        let (alice, mut rx_alice) = register(&mut *registry.write().await, 6001);
        let (_bob, mut rx_bob) = register(&mut *registry.write().await, 6002);
        registry.write().await.get_mut(alice).unwrap().nickname = "alice".to_string();

        disconnect(&registry, alice).await;
        disconnect(&registry, alice).await;

        assert_eq!(drain(&mut rx_bob), vec!["alice has left!"]);
        assert_eq!(drain(&mut rx_alice), vec!["quit"]);
        assert_eq!(registry.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_plain_text_until_limit() {
        let registry = Registry::shared(4);
        let (alice, mut rx_alice) = register(&mut *registry.write().await, 6001);
        registry.write().await.get_mut(alice).unwrap().nickname = "alice".to_string();
        let policy = Policy::default();

        for i in 1..=21 {
            let flow = dispatch(&registry, &policy, alice, &format!("m{}", i)).await;
            assert_eq!(flow, Flow::Continue);
        }

        let received = drain(&mut rx_alice);
        assert_eq!(received.len(), 21);
        assert_eq!(received[0], "alice: m1");
        assert_eq!(received[19], "alice: m20");
        assert_eq!(received[20], "Message limit, wait 1 hour");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_command_only_notifies_sender() {
        let registry = Registry::shared(4);
        let (alice, mut rx_alice) = register(&mut *registry.write().await, 6001);
        let (_bob, mut rx_bob) = register(&mut *registry.write().await, 6002);

        dispatch(&registry, &Policy::default(), alice, "/foo bar").await;

        assert_eq!(drain(&mut rx_alice), vec!["Invalid Command"]);
        assert!(drain(&mut rx_bob).is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_nick_without_argument() {
        let registry = Registry::shared(4);
        let (alice, mut rx_alice) = register(&mut *registry.write().await, 6001);

        dispatch(&registry, &Policy::default(), alice, "/nick").await;

        assert_eq!(
            drain(&mut rx_alice),
            vec!["Invalid Command", "Please write /nick <your nick>"]
        );
    }

    #[tokio::test]
    async fn test_overflowing_session_is_disconnected() {
        let registry = Registry::shared(4);
        let (_bob, mut rx_bob) = register(&mut *registry.write().await, 6002);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, addr) = listener.accept().await.unwrap();
        let settings = ConnectionSettings {
            policy: Policy::default(),
            framing: Framing::Line,
            queue_limit: 4,
        };
        let connection = tokio::spawn(handle_connection(
            stream,
            addr,
            SharedRegistry::clone(&registry),
            settings,
        ));

        let mut lines = BufReader::new(client).lines();
        for expected in WELCOME.lines() {
            assert_eq!(lines.next_line().await.unwrap().unwrap(), expected);
        }
        let id = registry.read().await.find_by_nickname(&addr.to_string()).unwrap();
        registry.read().await.get(id).unwrap().overflow_signal().notify_one();

        timeout(Duration::from_secs(5), connection).await.unwrap().unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("quit"));
        assert!(lines.next_line().await.unwrap().is_none());
        assert_eq!(drain(&mut rx_bob), vec![format!("{} has left!", addr)]);
        assert_eq!(registry.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_quit() {
        let registry = Registry::shared(4);
        let (alice, _rx) = register(&mut *registry.write().await, 6001);

        assert_eq!(
            dispatch(&registry, &Policy::default(), alice, "quit").await,
            Flow::Close
        );
    }
}
