//! Socket server for the two bridge directions
//!
//! Both listening sockets are bound up front so that bind errors surface to the
//! caller. Accepting and serving then happens on a dedicated transport thread
//! that drives a small executor; the game's tick thread only ever touches the
//! mailboxes on [`Bridge`].
//!
//! Several clients may connect to either socket. Command clients all publish
//! into one mailbox, so the latest write from any of them wins. Observation
//! clients all take from one mailbox, so each observation is sent to only one
//! of them.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_io::Timer;
use async_net::unix::{UnixListener, UnixStream};
use futures_lite::future;
use futures_lite::io::{AsyncReadExt, AsyncWriteExt};
use smol::channel::{self, Receiver, Sender};
use smol::{Executor, Task};

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::input::InputSink;
use crate::ipc::protocol::{self, Command, ProtocolLimits};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Which of the two sockets a listener serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketRole {
    Observation,
    Command,
}

impl fmt::Display for SocketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketRole::Observation => f.write_str("observation"),
            SocketRole::Command => f.write_str("command"),
        }
    }
}

/// Lifecycle of a [`SocketServer`]
///
/// `Starting` and `Stopping` only exist inside [`SocketServer::start`] and
/// [`SocketServer::stop`]; callers observe `Running` or `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Serves observations to and reads commands from agent processes
pub struct SocketServer {
    observation_path: PathBuf,
    command_path: PathBuf,
    running: Arc<AtomicBool>,
    shutdown: Sender<()>,
    transport: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
    state: ServerState,
}

impl SocketServer {
    /// Bind both sockets and start serving on a background thread
    ///
    /// Stale socket files left by a previous run are replaced. If either bind
    /// fails, no socket file is left behind.
    pub fn start<S: InputSink + 'static>(
        config: &BridgeConfig,
        bridge: Arc<Bridge<S>>,
    ) -> Result<Self> {
        let observation_path = config.observation_socket().to_path_buf();
        let command_path = config.command_socket().to_path_buf();
        tracing::debug!(state = ?ServerState::Starting, "socket server starting");

        let observation_listener = match bind(SocketRole::Observation, &observation_path) {
            Ok(listener) => listener,
            Err(e) => {
                remove_socket_file(&observation_path);
                return Err(e);
            }
        };
        let command_listener = match bind(SocketRole::Command, &command_path) {
            Ok(listener) => listener,
            Err(e) => {
                drop(observation_listener);
                remove_socket_file(&observation_path);
                remove_socket_file(&command_path);
                return Err(e);
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let (shutdown, shutdown_rx) = channel::bounded::<()>(1);
        let limits = *config.limits();

        let spawned = {
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("tickbridge-transport".to_string())
                .spawn(move || {
                    run_transport(
                        observation_listener,
                        command_listener,
                        bridge,
                        limits,
                        running,
                        shutdown_rx,
                    )
                })
        };
        let transport = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                running.store(false, Ordering::SeqCst);
                remove_socket_file(&observation_path);
                remove_socket_file(&command_path);
                return Err(Error::Spawn(e));
            }
        };

        tracing::info!(
            observation = %observation_path.display(),
            command = %command_path.display(),
            "socket server running"
        );

        Ok(Self {
            observation_path,
            command_path,
            running,
            shutdown,
            transport: Some(transport),
            shutdown_timeout: config.shutdown_timeout(),
            state: ServerState::Running,
        })
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ServerState::Running
    }

    pub fn observation_socket(&self) -> &Path {
        &self.observation_path
    }

    pub fn command_socket(&self) -> &Path {
        &self.command_path
    }

    /// Stop serving, close every connection and remove the socket files
    ///
    /// Waits up to the configured shutdown timeout for the transport thread.
    /// Calling this more than once is harmless.
    pub fn stop(&mut self) {
        if self.state == ServerState::Stopped {
            return;
        }
        self.state = ServerState::Stopping;
        tracing::info!("socket server stopping");

        self.running.store(false, Ordering::SeqCst);
        self.shutdown.close();

        if let Some(transport) = self.transport.take()
            && !join_with_timeout(transport, self.shutdown_timeout)
        {
            tracing::warn!(
                timeout = ?self.shutdown_timeout,
                "transport thread did not stop in time, detaching it"
            );
        }

        remove_socket_file(&self.observation_path);
        remove_socket_file(&self.command_path);

        self.state = ServerState::Stopped;
        tracing::info!("socket server stopped");
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketServer")
            .field("observation_path", &self.observation_path)
            .field("command_path", &self.command_path)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn bind(role: SocketRole, path: &Path) -> Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(socket = %role, path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(socket = %role, error = %e, "could not remove stale socket"),
    }

    let bound = (|| -> io::Result<UnixListener> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        UnixListener::bind(path)
    })();

    bound.map_err(|source| {
        tracing::error!(socket = %role, path = %path.display(), error = %source, "failed to bind");
        Error::Bind {
            role,
            path: path.to_path_buf(),
            source,
        }
    })
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed socket file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove socket file"),
    }
}

fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
    if handle.join().is_err() {
        tracing::warn!("transport thread panicked");
    }
    true
}

/// Run `fut` until it completes or the server shuts down
async fn until_shutdown<T>(shutdown: &Receiver<()>, fut: impl Future<Output = T>) -> Option<T> {
    future::or(async { Some(fut.await) }, async {
        // nothing is ever sent; the channel only closes
        let _ = shutdown.recv().await;
        None
    })
    .await
}

fn run_transport<S: InputSink + 'static>(
    observation_listener: UnixListener,
    command_listener: UnixListener,
    bridge: Arc<Bridge<S>>,
    limits: ProtocolLimits,
    running: Arc<AtomicBool>,
    shutdown: Receiver<()>,
) {
    let executor: Arc<Executor<'static>> = Arc::new(Executor::new());

    let observation_acceptor = {
        let bridge = Arc::clone(&bridge);
        let running_worker = Arc::clone(&running);
        let shutdown_worker = shutdown.clone();
        executor.spawn(accept_loop(
            SocketRole::Observation,
            observation_listener,
            Arc::clone(&executor),
            Arc::clone(&running),
            shutdown.clone(),
            move |stream| {
                serve_observations(
                    stream,
                    Arc::clone(&bridge),
                    Arc::clone(&running_worker),
                    shutdown_worker.clone(),
                )
            },
        ))
    };

    let command_acceptor = {
        let running_worker = Arc::clone(&running);
        let shutdown_worker = shutdown.clone();
        executor.spawn(accept_loop(
            SocketRole::Command,
            command_listener,
            Arc::clone(&executor),
            Arc::clone(&running),
            shutdown.clone(),
            move |stream| {
                serve_commands(
                    stream,
                    Arc::clone(&bridge),
                    limits,
                    Arc::clone(&running_worker),
                    shutdown_worker.clone(),
                )
            },
        ))
    };

    smol::block_on(executor.run(async move {
        observation_acceptor.await;
        command_acceptor.await;
    }));
    tracing::debug!("transport thread exiting");
}

async fn accept_loop<F, Fut>(
    role: SocketRole,
    listener: UnixListener,
    executor: Arc<Executor<'static>>,
    running: Arc<AtomicBool>,
    shutdown: Receiver<()>,
    mut serve: F,
) where
    F: FnMut(UnixStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tracing::debug!(socket = %role, "acceptor started");
    let mut workers: Vec<Task<()>> = Vec::new();

    while running.load(Ordering::SeqCst) {
        let Some(accepted) = until_shutdown(&shutdown, listener.accept()).await else {
            break;
        };

        match accepted {
            Ok((stream, _addr)) => {
                tracing::info!(socket = %role, "client connected");
                workers.retain(|worker| !worker.is_finished());
                workers.push(executor.spawn(serve(stream)));
            }
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                tracing::warn!(socket = %role, error = %e, "failed to accept connection");
                Timer::after(ACCEPT_BACKOFF).await;
            }
        }
    }

    drop(listener);
    tracing::debug!(socket = %role, workers = workers.len(), "acceptor closed, draining connections");
    for worker in workers {
        worker.await;
    }
    tracing::debug!(socket = %role, "acceptor stopped");
}

async fn serve_observations<S: InputSink>(
    mut stream: UnixStream,
    bridge: Arc<Bridge<S>>,
    running: Arc<AtomicBool>,
    shutdown: Receiver<()>,
) {
    let mut sent: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let Some(observation) =
            until_shutdown(&shutdown, bridge.observations().wait_and_take()).await
        else {
            break;
        };

        let message = match protocol::encode_observation(&observation) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping observation that cannot be encoded");
                continue;
            }
        };

        match until_shutdown(&shutdown, stream.write_all(&message)).await {
            Some(Ok(())) => {
                sent += 1;
                tracing::trace!(bytes = message.len(), reward = observation.reward, "observation sent");
            }
            Some(Err(e)) => {
                tracing::info!(error = %e, "observation client disconnected");
                break;
            }
            None => break,
        }
    }

    tracing::debug!(sent, "observation connection closed");
}

async fn serve_commands<S: InputSink>(
    mut stream: UnixStream,
    bridge: Arc<Bridge<S>>,
    limits: ProtocolLimits,
    running: Arc<AtomicBool>,
    shutdown: Receiver<()>,
) {
    bridge.set_client_connected(true);
    let mut received: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let Some(result) = until_shutdown(&shutdown, read_command(&mut stream, &limits)).await
        else {
            break;
        };

        match result {
            Ok(Some(command)) => {
                received += 1;
                tracing::debug!(
                    keys = command.keys.len(),
                    mouse_dx = command.mouse_dx,
                    mouse_dy = command.mouse_dy,
                    buttons = command.mouse_buttons.bits(),
                    scroll = command.scroll_delta,
                    text_len = command.text.len(),
                    "command received"
                );
                bridge.commands().publish(command);
            }
            Ok(None) => {
                tracing::info!("command client disconnected");
                break;
            }
            Err(Error::ProtocolViolation(e)) => {
                tracing::warn!(error = %e, "closing command connection after protocol violation");
                break;
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "command connection failed");
                }
                break;
            }
        }
    }

    drop(stream);
    bridge.set_client_connected(false);
    bridge.reset_input();
    tracing::debug!(received, "command connection closed");
}

/// Read one command message
///
/// Returns `None` on end of stream, including a stream that ends mid-message.
async fn read_command(
    stream: &mut UnixStream,
    limits: &ProtocolLimits,
) -> Result<Option<Command>> {
    let mut count = [0u8; 1];
    if !read_frame_part(stream, &mut count).await? {
        return Ok(None);
    }
    let key_count = usize::from(count[0]);
    limits.check_key_count(key_count)?;

    let mut message = vec![0u8; 1 + protocol::command_fixed_len(key_count)];
    message[0] = count[0];
    if !read_frame_part(stream, &mut message[1..]).await? {
        tracing::debug!("command client disconnected mid-message");
        return Ok(None);
    }

    let text_len = protocol::command_text_len(&message)?;
    limits.check_text_len(text_len)?;
    if text_len > 0 {
        let head_len = message.len();
        message.resize(head_len + text_len, 0);
        if !read_frame_part(stream, &mut message[head_len..]).await? {
            tracing::debug!("command client disconnected mid-message");
            return Ok(None);
        }
    }

    Ok(Some(protocol::decode_command(&message, limits)?))
}

/// Fill `buf` completely, returning `false` on end of stream
async fn read_frame_part(stream: &mut UnixStream, buf: &mut [u8]) -> io::Result<bool> {
    match stream.read_exact(buf).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream as StdUnixStream;

    use tempfile::TempDir;

    use crate::input::keys::{A, W};
    use crate::input::{InputEvent, KeyAction, RecordingSink};
    use crate::ipc::client::{CommandClient, ObservationClient};
    use crate::ipc::{MouseButtons, Observation};

    const WAIT: Duration = Duration::from_secs(5);

    fn config(dir: &TempDir) -> BridgeConfig {
        BridgeConfig::builder()
            .observation_socket(dir.path().join("obs.sock"))
            .command_socket(dir.path().join("cmd.sock"))
            .shutdown_timeout(Duration::from_secs(2))
            .build()
    }

    fn start(config: &BridgeConfig) -> (SocketServer, Arc<Bridge<RecordingSink>>) {
        let bridge = Arc::new(Bridge::new(RecordingSink::new(), config));
        let server = SocketServer::start(config, Arc::clone(&bridge)).unwrap();
        (server, bridge)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_start_and_stop_manage_socket_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let (mut server, _bridge) = start(&config);

        assert_eq!(server.state(), ServerState::Running);
        assert!(config.observation_socket().exists());
        assert!(config.command_socket().exists());

        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(!config.observation_socket().exists());
        assert!(!config.command_socket().exists());

        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn test_stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        std::fs::write(config.observation_socket(), b"stale").unwrap();

        let (server, _bridge) = start(&config);
        assert!(server.is_running());
    }

    #[test]
    fn test_bind_failure_leaves_no_socket_files() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let config = BridgeConfig::builder()
            .observation_socket(dir.path().join("obs.sock"))
            .command_socket(blocker.join("cmd.sock"))
            .build();
        let bridge = Arc::new(Bridge::new(RecordingSink::new(), &config));

        let result = SocketServer::start(&config, bridge);
        assert!(matches!(
            result,
            Err(Error::Bind {
                role: SocketRole::Command,
                ..
            })
        ));
        assert!(!config.observation_socket().exists());
    }

    #[test]
    fn test_command_reaches_mailbox() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let (_server, bridge) = start(&config);

        let command = Command {
            keys: vec![W],
            mouse_dx: 2.5,
            mouse_dy: -1.0,
            mouse_buttons: MouseButtons::RIGHT,
            scroll_delta: 1.0,
            text: "hi".to_string(),
        };
        let mut client = CommandClient::connect(config.command_socket()).unwrap();
        client.send(&command).unwrap();

        assert!(wait_until(|| bridge.commands().is_pending()));
        assert!(bridge.is_client_connected());
        assert_eq!(bridge.commands().take_latest(), Some(command));
    }

    #[test]
    fn test_observation_delivers_latest() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let (_server, bridge) = start(&config);

        bridge.publish_observation(1.0, vec![1; 8]);
        bridge.publish_observation(2.0, vec![2; 8]);
        bridge.publish_observation(3.0, vec![3; 8]);

        let mut client =
            ObservationClient::connect(config.observation_socket(), *config.limits()).unwrap();
        client.set_read_timeout(Some(WAIT)).unwrap();

        let observation = client.recv().unwrap();
        assert_eq!(observation, Some(Observation::new(3.0, vec![3; 8])));
    }

    #[test]
    fn test_disconnect_releases_held_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let (_server, bridge) = start(&config);

        let mut client = CommandClient::connect(config.command_socket()).unwrap();
        client
            .send(&Command {
                keys: vec![W, A],
                mouse_buttons: MouseButtons::LEFT,
                ..Default::default()
            })
            .unwrap();

        assert!(wait_until(|| bridge.tick()));
        assert_eq!(bridge.with_injector(|i| i.pressed_keys().len()), 2);

        drop(client);
        assert!(wait_until(|| {
            !bridge.is_client_connected()
                && bridge.with_injector(|i| i.pressed_keys().is_empty() && i.mouse_buttons().is_empty())
        }));

        let releases = bridge.with_injector(|i| {
            i.sink()
                .events()
                .iter()
                .filter(|e| {
                    matches!(
                        e,
                        InputEvent::Key {
                            action: KeyAction::Release,
                            ..
                        } | InputEvent::MouseButton {
                            action: KeyAction::Release,
                            ..
                        }
                    )
                })
                .count()
        });
        assert_eq!(releases, 3);
    }

    /// Hold W and the left button, then end the stream with a partial message
    fn disconnect_mid_message(partial: &[u8]) {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let (_server, bridge) = start(&config);

        let mut raw = StdUnixStream::connect(config.command_socket()).unwrap();
        let hold = Command {
            keys: vec![W],
            mouse_buttons: MouseButtons::LEFT,
            ..Default::default()
        };
        raw.write_all(&protocol::encode_command(&hold).unwrap())
            .unwrap();
        assert!(wait_until(|| bridge.tick()));
        assert!(bridge.is_client_connected());
        assert_eq!(bridge.with_injector(|i| i.pressed_keys().len()), 1);

        raw.write_all(partial).unwrap();
        drop(raw);

        assert!(wait_until(|| {
            !bridge.is_client_connected()
                && bridge.with_injector(|i| i.pressed_keys().is_empty() && i.mouse_buttons().is_empty())
        }));
        assert!(!bridge.commands().is_pending());
    }

    #[test]
    fn test_eof_inside_fixed_span_resets_input() {
        // two keys announced, one and a half sent
        disconnect_mid_message(&[2, 0, 87, 0]);
    }

    #[test]
    fn test_eof_inside_text_span_resets_input() {
        let message = protocol::encode_command(&Command {
            keys: vec![A],
            text: "abcdefghij".to_string(),
            ..Default::default()
        })
        .unwrap();
        disconnect_mid_message(&message[..message.len() - 7]);
    }

    #[test]
    fn test_protocol_violation_closes_only_offending_connection() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::builder()
            .observation_socket(dir.path().join("obs.sock"))
            .command_socket(dir.path().join("cmd.sock"))
            .max_keys(4)
            .build();
        let (_server, bridge) = start(&config);

        let mut good = CommandClient::connect(config.command_socket()).unwrap();
        let mut bad = StdUnixStream::connect(config.command_socket()).unwrap();
        bad.set_read_timeout(Some(WAIT)).unwrap();
        bad.write_all(&[10]).unwrap();

        let mut buf = [0u8; 1];
        let read = bad.read(&mut buf);
        assert!(matches!(read, Ok(0) | Err(_)));

        let command = Command {
            keys: vec![A],
            ..Default::default()
        };
        good.send(&command).unwrap();
        assert!(wait_until(|| bridge.commands().is_pending()));
        assert_eq!(bridge.commands().take_latest(), Some(command));
    }

    #[test]
    fn test_stop_closes_connected_clients() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let (mut server, bridge) = start(&config);

        let mut observer =
            ObservationClient::connect(config.observation_socket(), *config.limits()).unwrap();
        observer.set_read_timeout(Some(WAIT)).unwrap();
        let _commander = CommandClient::connect(config.command_socket()).unwrap();
        assert!(wait_until(|| bridge.is_client_connected()));

        let started = Instant::now();
        server.stop();
        assert!(started.elapsed() < Duration::from_secs(2));

        assert!(matches!(observer.recv(), Ok(None) | Err(_)));
        assert!(!bridge.is_client_connected());
        assert!(!config.command_socket().exists());
    }
}
