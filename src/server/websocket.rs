//! Local WebSocket server for the overlay UI
//!
//! One accept thread and one thread per connection. Each connection owns a
//! [`Session`]; the connection loop feeds it text frames and sends whatever it
//! drains. The session is closed when the socket goes away.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};
use tungstenite::{accept, Message, WebSocket};

use crate::core::constants::CONNECTION_POLL_DELAY;
use crate::core::session::{Session, SessionSettings};
use crate::core::store::ConfigStore;
use crate::core::traits::Upstream;

// =============================================================================
// SERVER
// =============================================================================

/// Everything a connection needs to open its session
#[derive(Clone)]
struct Shared {
    store: Arc<ConfigStore>,
    upstream: Upstream,
    settings: SessionSettings,
    shutdown_flag: Arc<AtomicBool>,
}

pub struct LocalServer {
    listener: TcpListener,
    shared: Shared,
    next_id: AtomicU64,
}

impl LocalServer {
    /// Bind the listening socket; port 0 picks a free port
    pub fn bind(
        addr: &str,
        store: Arc<ConfigStore>,
        upstream: Upstream,
        settings: SessionSettings,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            shared: Shared {
                store,
                upstream,
                settings,
                shutdown_flag: Arc::new(AtomicBool::new(false)),
            },
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the shutdown flag is set
    pub fn run(self) {
        let addr = self.local_addr().ok();
        info!(addr = ?addr, "[ws] Listening");

        let mut connections: Vec<JoinHandle<()>> = Vec::new();
        while !self.shared.shutdown_flag.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    let shared = self.shared.clone();
                    let spawned = thread::Builder::new()
                        .name(format!("ws-{}", id))
                        .spawn(move || connection_thread(id, peer, stream, shared));
                    match spawned {
                        Ok(handle) => connections.push(handle),
                        Err(e) => error!(error = %e, "[ws] Failed to spawn connection thread"),
                    }
                    connections.retain(|handle| !handle.is_finished());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(CONNECTION_POLL_DELAY);
                }
                Err(e) => {
                    warn!(error = %e, "[ws] Accept failed");
                    thread::sleep(CONNECTION_POLL_DELAY);
                }
            }
        }

        for handle in connections {
            let _ = handle.join();
        }
        info!("[ws] Server stopped");
    }

    /// Run the accept loop on its own thread
    pub fn spawn(self) -> io::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let shutdown_flag = Arc::clone(&self.shared.shutdown_flag);
        let thread_handle = thread::Builder::new()
            .name("ws-accept".to_string())
            .spawn(move || self.run())?;

        Ok(ServerHandle {
            addr,
            shutdown_flag,
            thread_handle: Some(thread_handle),
        })
    }

    /// Flag that stops [`LocalServer::run`] and every connection when set
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.shutdown_flag)
    }
}

/// A server running on a background thread
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_flag: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, close every connection and wait for the threads
    pub fn shutdown(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// CONNECTION THREAD
// =============================================================================

fn connection_thread(id: u64, peer: SocketAddr, stream: TcpStream, shared: Shared) {
    // Accepted sockets may inherit the listener's non-blocking mode
    if let Err(e) = stream.set_nonblocking(false) {
        warn!(error = %e, "[ws] Failed to reset socket mode");
    }

    let mut socket = match accept(stream) {
        Ok(socket) => socket,
        Err(e) => {
            warn!(peer = %peer, error = %e, "[ws] Handshake failed");
            return;
        }
    };
    info!(session = id, peer = %peer, "[ws] Client connected");

    let mut session = Session::open(
        id,
        Arc::clone(&shared.store),
        shared.upstream.clone(),
        shared.settings,
    );

    match message_loop(&mut socket, &session, &shared.shutdown_flag) {
        Ok(()) => info!(session = id, "[ws] Client disconnected"),
        Err(e) => info!(session = id, error = %e, "[ws] Connection dropped"),
    }

    session.close();
    let _ = socket.close(None);
    let _ = socket.flush();
}

fn message_loop(
    socket: &mut WebSocket<TcpStream>,
    session: &Session,
    shutdown_flag: &AtomicBool,
) -> Result<(), String> {
    socket
        .get_ref()
        .set_nonblocking(true)
        .map_err(|e| format!("Set non-blocking: {}", e))?;

    loop {
        if shutdown_flag.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Handle incoming
        loop {
            match socket.read() {
                Ok(Message::Text(text)) => session.handle_text(&text),
                Ok(Message::Close(_)) => return Ok(()),
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    break
                }
                Err(tungstenite::Error::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(format!("Read error: {}", e)),
            }
        }

        // Handle outgoing
        for frame in session.drain() {
            let json = frame.to_json().map_err(|e| e.to_string())?;
            match socket.send(Message::Text(json)) {
                Ok(()) => {}
                Err(tungstenite::Error::Io(ref e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    debug!(session = session.id(), "[ws] Send buffered");
                }
                Err(e) => return Err(format!("Send error: {}", e)),
            }
        }
        match socket.flush() {
            Ok(()) => {}
            Err(tungstenite::Error::Io(ref e)) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(format!("Flush error: {}", e)),
        }

        thread::sleep(CONNECTION_POLL_DELAY);
    }
}
