//! RPC server implementation
//!
//! Listens on a local socket or loopback TCP port and serves each connection on
//! its own thread. Every connection gets its own handler from a
//! [`HandlerFactory`], so per-connection state is never shared.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Result;
use crate::ipc::protocol::{DEFAULT_MAX_FRAME_LEN, ReplyFrame, RequestFrame, read_frame, write_frame};
use crate::ipc::transport::{Endpoint, Listener, Stream};

/// Identifies one accepted connection for the lifetime of the server
pub type ConnectionId = u64;

/// What a handler learns about its connection when it is opened
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    /// Peer address, or the socket path for local sockets
    pub peer: String,
}

/// Per-connection request handler
pub trait ConnectionHandler: Send + 'static {
    /// Produce the reply for one request
    fn handle(&mut self, request: &RequestFrame) -> ReplyFrame;

    /// The connection is gone; release whatever it held
    fn closed(&mut self) {}

    /// Whether the server should stop reading after the current reply
    fn wants_close(&self) -> bool {
        false
    }
}

/// Produces an isolated handler for every accepted connection
pub trait HandlerFactory: Send + Sync + 'static {
    type Handler: ConnectionHandler;

    fn open(&self, info: &ConnectionInfo) -> Self::Handler;
}

struct Shared<F> {
    factory: F,
    running: AtomicBool,
    next_id: AtomicU64,
    max_frame_len: usize,
    // streams kept so `stop` can unblock their readers
    streams: Mutex<HashMap<ConnectionId, Stream>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Thread-per-connection RPC server
pub struct Server<F: HandlerFactory> {
    shared: Arc<Shared<F>>,
    endpoint: Endpoint,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<F: HandlerFactory> Server<F> {
    /// Bind `endpoint` and start accepting connections
    pub fn start(endpoint: &Endpoint, factory: F) -> Result<Self> {
        Self::start_with_limit(endpoint, factory, DEFAULT_MAX_FRAME_LEN)
    }

    /// Like [`Server::start`] with an explicit frame size limit
    pub fn start_with_limit(endpoint: &Endpoint, factory: F, max_frame_len: usize) -> Result<Self> {
        let listener = Listener::bind(endpoint)?;
        let endpoint = listener.local_endpoint()?;

        tracing::info!(%endpoint, "RPC server started");

        let shared = Arc::new(Shared {
            factory,
            running: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            max_frame_len,
            streams: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_thread = std::thread::Builder::new()
            .name("rpc-accept".to_string())
            .spawn(move || run_server(listener, accept_shared))?;

        Ok(Self {
            shared,
            endpoint,
            accept_thread: Mutex::new(Some(accept_thread)),
        })
    }

    /// The endpoint actually bound
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn factory(&self) -> &F {
        &self.shared.factory
    }

    /// Number of connections currently being served
    pub fn connection_count(&self) -> usize {
        lock(&self.shared.streams).len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Stop accepting, close every connection and wait for their threads
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(endpoint = %self.endpoint, "RPC server stopping");

        // wake the accept loop
        let _ = Stream::connect(&self.endpoint, Duration::from_millis(200));
        if let Some(handle) = lock(&self.accept_thread).take() {
            let _ = handle.join();
        }

        for stream in lock(&self.shared.streams).values() {
            let _ = stream.shutdown();
        }
        let workers: Vec<_> = lock(&self.shared.workers).drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl<F: HandlerFactory> Drop for Server<F> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Main server accept loop
fn run_server<F: HandlerFactory>(listener: Listener, shared: Arc<Shared<F>>) {
    while shared.running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
                let info = ConnectionInfo { id, peer };
                spawn_connection(&shared, stream, info);
            }
            Err(e) => {
                if shared.running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "failed to accept RPC connection");
                }
            }
        }
    }
    listener.cleanup();
}

fn spawn_connection<F: HandlerFactory>(shared: &Arc<Shared<F>>, stream: Stream, info: ConnectionInfo) {
    match stream.try_clone() {
        Ok(tracked) => {
            lock(&shared.streams).insert(info.id, tracked);
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to track RPC connection");
            return;
        }
    }

    let worker_shared = Arc::clone(shared);
    let id = info.id;
    let spawned = std::thread::Builder::new()
        .name(format!("conn-{id}"))
        .spawn(move || {
            tracing::debug!(connection = id, peer = %info.peer, "connection accepted");
            let handler = worker_shared.factory.open(&info);
            handle_connection(stream, handler, worker_shared.max_frame_len);
            lock(&worker_shared.streams).remove(&id);
            tracing::debug!(connection = id, "connection closed");
        });

    match spawned {
        Ok(handle) => {
            let mut workers = lock(&shared.workers);
            workers.retain(|worker| !worker.is_finished());
            workers.push(handle);
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to spawn connection thread");
            lock(&shared.streams).remove(&id);
        }
    }
}

/// Serve requests on one connection until it closes
fn handle_connection<H: ConnectionHandler>(mut stream: Stream, mut handler: H, max_frame_len: usize) {
    loop {
        let body = match read_frame(&mut stream, max_frame_len) {
            Ok(Some(body)) => body,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "failed to read request");
                break;
            }
        };

        let reply = match RequestFrame::from_bytes(&body) {
            Ok(request) => {
                tracing::trace!(method = %request.method, "handling RPC request");
                handler.handle(&request)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse RPC request");
                ReplyFrame::error(&e.to_remote())
            }
        };

        if let Err(e) = write_frame(&mut stream, &reply.to_bytes()) {
            tracing::debug!(error = %e, "failed to write reply");
            break;
        }

        if handler.wants_close() {
            break;
        }
    }

    handler.closed();
    let _ = stream.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BridgeError, ErrorCode};
    use crate::ipc::client::Client;

    struct Counter {
        calls: u32,
    }

    impl ConnectionHandler for Counter {
        fn handle(&mut self, request: &RequestFrame) -> ReplyFrame {
            match request.method.as_str() {
                "count" => {
                    self.calls += 1;
                    ReplyFrame::success(&self.calls).unwrap()
                }
                other => ReplyFrame::error(&BridgeError::UnknownMethod(other.to_string()).to_remote()),
            }
        }
    }

    struct CounterFactory;

    impl HandlerFactory for CounterFactory {
        type Handler = Counter;

        fn open(&self, _info: &ConnectionInfo) -> Counter {
            Counter { calls: 0 }
        }
    }

    fn start() -> Server<CounterFactory> {
        Server::start(&Endpoint::Tcp(0), CounterFactory).unwrap()
    }

    #[test]
    fn test_each_connection_has_own_handler() {
        let server = start();
        let mut a = Client::connect(server.endpoint(), Duration::from_secs(1)).unwrap();
        let mut b = Client::connect(server.endpoint(), Duration::from_secs(1)).unwrap();

        let no_args: [u8; 0] = [];
        assert_eq!(a.call::<_, u32>("count", &no_args).unwrap(), 1);
        assert_eq!(a.call::<_, u32>("count", &no_args).unwrap(), 2);
        assert_eq!(b.call::<_, u32>("count", &no_args).unwrap(), 1);
    }

    #[test]
    fn test_error_reply_keeps_connection_open() {
        let server = start();
        let mut client = Client::connect(server.endpoint(), Duration::from_secs(1)).unwrap();
        let no_args: [u8; 0] = [];

        match client.call::<_, u32>("nope", &no_args) {
            Err(BridgeError::Remote(remote)) => assert_eq!(remote.code, ErrorCode::UnknownMethod),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(client.call::<_, u32>("count", &no_args).unwrap(), 1);
    }

    #[test]
    fn test_stop_closes_connections() {
        let server = start();
        let mut client = Client::connect(server.endpoint(), Duration::from_secs(1)).unwrap();
        let no_args: [u8; 0] = [];
        client.call::<_, u32>("count", &no_args).unwrap();

        server.stop();
        assert!(!server.is_running());
        assert_eq!(server.connection_count(), 0);
        assert!(client.call::<_, u32>("count", &no_args).is_err());
    }
}
