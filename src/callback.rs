//! Backward channel from the engine to client callback servers
//!
//! Each session may open one backward connection to a server run by the
//! client. Engine events for a browser are turned into calls on that
//! connection: the browser's owner first, the master session otherwise.
//! Calls go through a bounded outbox drained by a sender thread, so the engine
//! thread never waits on a socket. Undeliverable events are dropped, and any
//! engine callback they carry is cancelled so the engine is not left waiting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{
    AuthCallback, BrowserEvent, BrowserEvents, Callback, HandlerMask, QueryCallback,
};
use crate::error::Result;
use crate::handle::{Handle, ObjectTable, TrackedObject};
use crate::ipc::{Client, ConnectionId, Endpoint, RequestFrame};

/// Backward method names
pub mod methods {
    pub const ON_AFTER_CREATED: &str = "onAfterCreated";
    pub const ON_BEFORE_CLOSE: &str = "onBeforeClose";
    pub const ON_ADDRESS_CHANGE: &str = "onAddressChange";
    pub const ON_LOAD_END: &str = "onLoadEnd";
    pub const ON_LOAD_ERROR: &str = "onLoadError";
    pub const ON_DOWNLOAD_UPDATED: &str = "onDownloadUpdated";
    pub const ON_IME_COMPOSITION_RANGE_CHANGED: &str = "onImeCompositionRangeChanged";
    pub const GET_AUTH_CREDENTIALS: &str = "getAuthCredentials";
    pub const ON_BEFORE_RESOURCE_LOAD: &str = "onBeforeResourceLoad";
    pub const ON_RESOURCE_RESPONSE: &str = "onResourceResponse";
    pub const ON_QUERY: &str = "MessageRouterHandler_onQuery";
    pub const ON_QUERY_CANCELED: &str = "MessageRouterHandler_onQueryCanceled";
    pub const STRING_VISITOR_VISIT: &str = "StringVisitor_visit";
    pub const ON_SERVER_SHUTDOWN: &str = "onServerShutdown";
}

/// Error code passed to a query callback that could not reach any client
pub const QUERY_UNDELIVERABLE: i32 = -1;

/// Negotiated role of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Master,
    Slave,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One open backward connection
pub struct BackwardConnection {
    id: ConnectionId,
    endpoint: Endpoint,
    outbox: Mutex<Option<SyncSender<RequestFrame>>>,
    alive: Arc<AtomicBool>,
    draining: Arc<AtomicBool>,
    sender: Mutex<Option<JoinHandle<()>>>,
}

impl BackwardConnection {
    /// Connect to the client's callback server and start the sender thread
    pub fn open(
        id: ConnectionId,
        endpoint: &Endpoint,
        timeout: Duration,
        capacity: usize,
    ) -> Result<Arc<Self>> {
        let client = Client::connect(endpoint, timeout)?;
        client.set_reply_timeout(Some(timeout))?;

        let (outbox, receiver) = mpsc::sync_channel(capacity);
        let alive = Arc::new(AtomicBool::new(true));
        let draining = Arc::new(AtomicBool::new(true));

        let thread_alive = Arc::clone(&alive);
        let thread_draining = Arc::clone(&draining);
        let sender = std::thread::Builder::new()
            .name(format!("backward-{id}"))
            .spawn(move || run_sender(id, client, receiver, thread_alive, thread_draining))?;

        tracing::info!(connection = id, %endpoint, "backward channel opened");

        Ok(Arc::new(Self {
            id,
            endpoint: endpoint.clone(),
            outbox: Mutex::new(Some(outbox)),
            alive,
            draining,
            sender: Mutex::new(Some(sender)),
        }))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Queue one call; `false` if it was dropped
    pub fn send(&self, frame: RequestFrame) -> bool {
        if !self.is_alive() {
            return false;
        }
        let outbox = lock(&self.outbox);
        let Some(outbox) = outbox.as_ref() else {
            return false;
        };
        match outbox.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                tracing::warn!(connection = self.id, method = %frame.method, "backward outbox full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.alive.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Stop the sender thread
    ///
    /// With `drain`, calls already queued are still delivered first.
    pub fn close(&self, drain: bool) {
        if !drain {
            self.draining.store(false, Ordering::SeqCst);
        }
        lock(&self.outbox).take();
        if let Some(sender) = lock(&self.sender).take() {
            let _ = sender.join();
        }
        self.alive.store(false, Ordering::SeqCst);
    }
}

fn run_sender(
    id: ConnectionId,
    mut client: Client,
    receiver: Receiver<RequestFrame>,
    alive: Arc<AtomicBool>,
    draining: Arc<AtomicBool>,
) {
    for frame in receiver.iter() {
        if !draining.load(Ordering::SeqCst) {
            break;
        }
        match client.call_raw(&frame) {
            Ok(reply) if !reply.success => {
                tracing::debug!(connection = id, method = %frame.method, "client answered backward call with an error");
            }
            Ok(_) => {}
            Err(e) => {
                // no reconnection; the session may call connect again
                tracing::warn!(connection = id, method = %frame.method, error = %e, "backward channel failed");
                alive.store(false, Ordering::SeqCst);
                break;
            }
        }
    }
    client.close();
    tracing::debug!(connection = id, "backward sender finished");
}

#[derive(Default)]
struct Channels {
    master: Option<ConnectionId>,
    backward: HashMap<ConnectionId, Arc<BackwardConnection>>,
}

/// Routes engine events to backward connections
pub struct CallbackBridge {
    objects: Arc<ObjectTable>,
    connect_timeout: Duration,
    outbox_capacity: usize,
    channels: Mutex<Channels>,
}

impl CallbackBridge {
    pub fn new(objects: Arc<ObjectTable>, connect_timeout: Duration, outbox_capacity: usize) -> Self {
        Self {
            objects,
            connect_timeout,
            outbox_capacity,
            channels: Mutex::new(Channels::default()),
        }
    }

    fn channels(&self) -> MutexGuard<'_, Channels> {
        lock(&self.channels)
    }

    /// Grant master to the first session asking for it
    pub fn claim_role(&self, connection: ConnectionId, wants_master: bool) -> Role {
        let mut channels = self.channels();
        match channels.master {
            Some(master) if master == connection => Role::Master,
            None if wants_master => {
                channels.master = Some(connection);
                Role::Master
            }
            _ => Role::Slave,
        }
    }

    pub fn master(&self) -> Option<ConnectionId> {
        self.channels().master
    }

    /// Open the backward connection of `connection`, replacing any previous one
    pub fn attach(&self, connection: ConnectionId, endpoint: &Endpoint) -> Result<()> {
        let opened = BackwardConnection::open(
            connection,
            endpoint,
            self.connect_timeout,
            self.outbox_capacity,
        );
        let previous = match opened {
            Ok(backward) => self.channels().backward.insert(connection, backward),
            Err(e) => {
                tracing::warn!(connection, %endpoint, error = %e, "failed to open backward channel");
                // a dead channel is not kept around
                let previous = self.channels().backward.remove(&connection);
                if let Some(previous) = previous {
                    previous.close(false);
                }
                return Err(e);
            }
        };
        if let Some(previous) = previous {
            previous.close(false);
        }
        Ok(())
    }

    /// Forget everything about a closed session
    pub fn detach(&self, connection: ConnectionId) {
        let removed = {
            let mut channels = self.channels();
            if channels.master == Some(connection) {
                channels.master = None;
                tracing::info!(connection, "master session closed");
            }
            channels.backward.remove(&connection)
        };
        if let Some(backward) = removed {
            backward.close(false);
        }
    }

    pub fn has_live_channel(&self, connection: ConnectionId) -> bool {
        self.channels()
            .backward
            .get(&connection)
            .is_some_and(|backward| backward.is_alive())
    }

    /// Backward channel for events owned by `owner`: the owner's own, else the master's
    fn route(&self, owner: Option<ConnectionId>) -> Option<Arc<BackwardConnection>> {
        let channels = self.channels();
        let live = |id: ConnectionId| {
            channels
                .backward
                .get(&id)
                .filter(|backward| backward.is_alive())
                .cloned()
        };
        owner.and_then(live).or_else(|| channels.master.and_then(live))
    }

    /// Event sink for a browser created by `owner`
    pub fn browser_channel(self: &Arc<Self>, owner: ConnectionId, handlers: HandlerMask) -> Arc<BrowserChannel> {
        Arc::new(BrowserChannel {
            bridge: Arc::downgrade(self),
            owner,
            handlers,
            handle: OnceLock::new(),
        })
    }

    /// Tell the master the server is going away
    pub fn broadcast_shutdown(&self) {
        let empty: [u8; 0] = [];
        match RequestFrame::new(methods::ON_SERVER_SHUTDOWN, &empty) {
            Ok(frame) => {
                if let Some(master) = self.route(None) {
                    master.send(frame);
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode shutdown notice"),
        }
    }

    /// Close every backward connection, delivering what is already queued
    pub fn shutdown(&self) {
        let all: Vec<_> = {
            let mut channels = self.channels();
            channels.master = None;
            channels.backward.drain().map(|(_, backward)| backward).collect()
        };
        for backward in all {
            backward.close(true);
        }
    }

    fn deliver(&self, owner: ConnectionId, browser: Handle, event: BrowserEvent) {
        let name = event.name();
        let Some(channel) = self.route(Some(owner)) else {
            tracing::debug!(%browser, event = name, "no backward channel, dropping event");
            Carried::of(&event).cancel();
            return;
        };

        let carried = Carried::of(&event);
        let mut registered = Vec::new();
        let frame = self.encode(browser, event, &mut registered);
        let sent = match frame {
            Ok(frame) => channel.send(frame),
            Err(e) => {
                tracing::warn!(%browser, event = name, error = %e, "failed to encode event");
                false
            }
        };
        if !sent {
            for handle in registered {
                self.objects.release(handle);
            }
            carried.cancel();
        }
    }

    /// Register an object handed out with an event of `browser`; it goes away with the browser
    fn register(&self, registered: &mut Vec<Handle>, browser: Handle, object: TrackedObject) -> Result<Handle> {
        let handle = self.objects.register_owned(object, browser)?;
        registered.push(handle);
        Ok(handle)
    }

    /// Build the backward call, registering the objects it hands to the client
    fn encode(&self, browser: Handle, event: BrowserEvent, registered: &mut Vec<Handle>) -> Result<RequestFrame> {
        let b = browser.raw();
        match event {
            BrowserEvent::AfterCreated => RequestFrame::new(methods::ON_AFTER_CREATED, &(b,)),
            BrowserEvent::BeforeClose => RequestFrame::new(methods::ON_BEFORE_CLOSE, &(b,)),
            BrowserEvent::AddressChange { url } => {
                RequestFrame::new(methods::ON_ADDRESS_CHANGE, &(b, url))
            }
            BrowserEvent::LoadEnd { http_status } => {
                RequestFrame::new(methods::ON_LOAD_END, &(b, http_status))
            }
            BrowserEvent::LoadError { code, text, url } => {
                RequestFrame::new(methods::ON_LOAD_ERROR, &(b, code, text, url))
            }
            BrowserEvent::DownloadUpdated {
                id,
                url,
                received,
                total,
                complete,
            } => RequestFrame::new(
                methods::ON_DOWNLOAD_UPDATED,
                &(b, id, url, received, total, complete),
            ),
            BrowserEvent::ImeCompositionRangeChanged { range } => RequestFrame::new(
                methods::ON_IME_COMPOSITION_RANGE_CHANGED,
                &(b, range.from, range.to),
            ),
            BrowserEvent::AuthRequested {
                callback,
                host,
                port,
                realm,
            } => {
                let callback = self.register(registered, browser, TrackedObject::AuthCallback(callback))?;
                RequestFrame::new(
                    methods::GET_AUTH_CREDENTIALS,
                    &(b, callback.raw(), host, port, realm),
                )
            }
            BrowserEvent::BeforeResourceLoad { request, callback } => {
                let request = self.register(registered, browser, TrackedObject::Request(request))?;
                let callback = self.register(registered, browser, TrackedObject::Callback(callback))?;
                RequestFrame::new(
                    methods::ON_BEFORE_RESOURCE_LOAD,
                    &(b, request.raw(), callback.raw()),
                )
            }
            BrowserEvent::ResourceResponse { request, response } => {
                let request = self.register(registered, browser, TrackedObject::Request(request))?;
                let response = self.register(registered, browser, TrackedObject::Response(response))?;
                RequestFrame::new(
                    methods::ON_RESOURCE_RESPONSE,
                    &(b, request.raw(), response.raw()),
                )
            }
            BrowserEvent::Query {
                handler,
                query_id,
                request,
                persistent,
                callback,
            } => {
                let callback = self.register(registered, browser, TrackedObject::QueryCallback(callback))?;
                RequestFrame::new(
                    methods::ON_QUERY,
                    &(handler, b, query_id, request, persistent, callback.raw()),
                )
            }
            BrowserEvent::QueryCanceled { handler, query_id } => {
                RequestFrame::new(methods::ON_QUERY_CANCELED, &(handler, b, query_id))
            }
            BrowserEvent::StringVisited { visitor, text } => {
                RequestFrame::new(methods::STRING_VISITOR_VISIT, &(visitor, text))
            }
        }
    }
}

/// Engine callback riding on an event
enum Carried {
    None,
    Auth(Arc<dyn AuthCallback>),
    Plain(Arc<dyn Callback>),
    Query(Arc<dyn QueryCallback>),
}

impl Carried {
    fn of(event: &BrowserEvent) -> Self {
        match event {
            BrowserEvent::AuthRequested { callback, .. } => Carried::Auth(Arc::clone(callback)),
            BrowserEvent::BeforeResourceLoad { callback, .. } => Carried::Plain(Arc::clone(callback)),
            BrowserEvent::Query { callback, .. } => Carried::Query(Arc::clone(callback)),
            _ => Carried::None,
        }
    }

    fn cancel(self) {
        match self {
            Carried::None => {}
            Carried::Auth(callback) => callback.cancel(),
            Carried::Plain(callback) => callback.cancel(),
            Carried::Query(callback) => callback.failure(QUERY_UNDELIVERABLE, "no client handler"),
        }
    }
}

/// Event sink handed to the engine for one browser
///
/// Bound to the browser's handle once it is registered; events emitted before
/// that are dropped.
pub struct BrowserChannel {
    bridge: Weak<CallbackBridge>,
    owner: ConnectionId,
    handlers: HandlerMask,
    handle: OnceLock<Handle>,
}

impl BrowserChannel {
    pub fn bind(&self, handle: Handle) {
        if self.handle.set(handle).is_err() {
            tracing::warn!(%handle, "browser channel already bound");
        }
    }

    pub fn handle(&self) -> Option<Handle> {
        self.handle.get().copied()
    }

    pub fn owner(&self) -> ConnectionId {
        self.owner
    }
}

impl BrowserEvents for BrowserChannel {
    fn emit(&self, event: BrowserEvent) {
        let Some(bridge) = self.bridge.upgrade() else {
            Carried::of(&event).cancel();
            return;
        };
        let Some(handle) = self.handle() else {
            tracing::debug!(event = event.name(), "event before browser registration, dropping");
            Carried::of(&event).cancel();
            return;
        };

        let closing = matches!(event, BrowserEvent::BeforeClose);
        let wanted = event
            .required_handler()
            .is_none_or(|required| self.handlers.contains(required));
        if wanted {
            bridge.deliver(self.owner, handle, event);
        } else {
            tracing::trace!(%handle, event = event.name(), "client has no handler for event");
            Carried::of(&event).cancel();
        }

        if closing {
            let released = bridge.objects.release_tree(handle);
            tracing::debug!(%handle, released, "browser closed, handles released");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::ipc::{ConnectionHandler, ConnectionInfo, HandlerFactory, ReplyFrame};

    /// Callback server recording every backward call
    #[derive(Clone, Default)]
    pub struct Recorder {
        calls: Arc<Mutex<Vec<RequestFrame>>>,
    }

    impl Recorder {
        pub fn methods(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|c| c.method.clone()).collect()
        }

        pub fn wait_for(&self, method: &str) -> RequestFrame {
            for _ in 0..200 {
                if let Some(call) = self.calls.lock().unwrap().iter().find(|c| c.method == method) {
                    return call.clone();
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            panic!("no {method} call arrived, got {:?}", self.methods());
        }
    }

    impl ConnectionHandler for Recorder {
        fn handle(&mut self, request: &RequestFrame) -> ReplyFrame {
            self.calls.lock().unwrap().push(request.clone());
            ReplyFrame::success(&()).unwrap()
        }
    }

    impl HandlerFactory for Recorder {
        type Handler = Recorder;

        fn open(&self, _info: &ConnectionInfo) -> Recorder {
            self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{NoopCallback, NoopQueryCallback};
    use super::testing::Recorder;
    use crate::ipc::Server;

    fn bridge() -> Arc<CallbackBridge> {
        Arc::new(CallbackBridge::new(
            Arc::new(ObjectTable::new()),
            Duration::from_secs(1),
            16,
        ))
    }

    fn listener() -> (Server<Recorder>, Recorder) {
        let recorder = Recorder::default();
        let server = Server::start(&Endpoint::Tcp(0), recorder.clone()).unwrap();
        (server, recorder)
    }

    #[test]
    fn test_first_master_wins() {
        let bridge = bridge();
        assert_eq!(bridge.claim_role(1, false), Role::Slave);
        assert_eq!(bridge.claim_role(2, true), Role::Master);
        assert_eq!(bridge.claim_role(3, true), Role::Slave);
        assert_eq!(bridge.claim_role(2, false), Role::Master);

        bridge.detach(2);
        assert_eq!(bridge.master(), None);
        assert_eq!(bridge.claim_role(3, true), Role::Master);
    }

    #[test]
    fn test_events_reach_owner() {
        let bridge = bridge();
        let (server, recorder) = listener();
        bridge.attach(1, server.endpoint()).unwrap();

        let channel = bridge.browser_channel(1, HandlerMask::DISPLAY);
        // not bound yet, dropped
        channel.emit(BrowserEvent::AfterCreated);
        channel.bind(Handle::from_raw(1 << 32));
        channel.emit(BrowserEvent::AddressChange {
            url: "https://example.com".to_string(),
        });

        let call = recorder.wait_for(methods::ON_ADDRESS_CHANGE);
        let (browser, url): (u64, String) = call.decode_params().unwrap();
        assert_eq!(browser, 1 << 32);
        assert_eq!(url, "https://example.com");
        assert!(!recorder.methods().contains(&methods::ON_AFTER_CREATED.to_string()));
    }

    #[test]
    fn test_unwanted_event_cancels_callback() {
        let bridge = bridge();
        let (server, recorder) = listener();
        bridge.attach(1, server.endpoint()).unwrap();

        let channel = bridge.browser_channel(1, HandlerMask::NONE);
        channel.bind(Handle::from_raw(1 << 32));
        let callback = Arc::new(NoopCallback::default());
        channel.emit(BrowserEvent::BeforeResourceLoad {
            request: Arc::new(crate::engine::headless::HeadlessRequest::new("https://example.com", "GET")),
            callback: callback.clone(),
        });

        assert_eq!(callback.canceled.load(Ordering::SeqCst), 1);
        assert!(bridge.objects.is_empty());
        channel.emit(BrowserEvent::AfterCreated);
        recorder.wait_for(methods::ON_AFTER_CREATED);
    }

    #[test]
    fn test_falls_back_to_master_then_drops() {
        let bridge = bridge();
        let (server, recorder) = listener();
        assert_eq!(bridge.claim_role(9, true), Role::Master);
        bridge.attach(9, server.endpoint()).unwrap();

        // owner 1 has no backward channel
        let browser = bridge.objects.register(TrackedObject::Callback(Arc::new(NoopCallback::default())));
        let channel = bridge.browser_channel(1, HandlerMask::NONE);
        channel.bind(browser);
        let query = Arc::new(NoopQueryCallback::default());
        channel.emit(BrowserEvent::Query {
            handler: crate::engine::ClientObjectId(4),
            query_id: 1,
            request: "ping".to_string(),
            persistent: false,
            callback: query.clone(),
        });
        let call = recorder.wait_for(methods::ON_QUERY);
        let (handler, _browser, query_id, request, _persistent, callback): (i32, u64, i64, String, bool, u64) =
            call.decode_params().unwrap();
        assert_eq!((handler, query_id, request.as_str()), (4, 1, "ping"));
        assert!(bridge.objects.query_callback(Handle::from_raw(callback)).is_ok());

        bridge.detach(9);
        channel.emit(BrowserEvent::Query {
            handler: crate::engine::ClientObjectId(4),
            query_id: 2,
            request: "pong".to_string(),
            persistent: false,
            callback: query.clone(),
        });
        assert_eq!(query.answers.lock().unwrap().len(), 1);
        // only the delivered query's callback stays registered, next to its browser
        assert_eq!(bridge.objects.len(), 2);
    }

    #[test]
    fn test_dead_channel_is_not_reconnected() {
        let bridge = bridge();
        let (server, recorder) = listener();
        bridge.attach(1, server.endpoint()).unwrap();
        server.stop();

        let channel = bridge.browser_channel(1, HandlerMask::NONE);
        channel.bind(Handle::from_raw(1 << 32));
        for _ in 0..50 {
            if !bridge.has_live_channel(1) {
                break;
            }
            channel.emit(BrowserEvent::AfterCreated);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!bridge.has_live_channel(1));

        // a new listener does not revive the channel until attach is called again
        let (server, fresh) = listener();
        channel.emit(BrowserEvent::AfterCreated);
        assert!(fresh.methods().is_empty());
        bridge.attach(1, server.endpoint()).unwrap();
        channel.emit(BrowserEvent::AfterCreated);
        fresh.wait_for(methods::ON_AFTER_CREATED);
        drop(recorder);
    }

    #[test]
    fn test_before_close_releases_handle() {
        let bridge = bridge();
        let (server, recorder) = listener();
        bridge.attach(1, server.endpoint()).unwrap();

        let browser = bridge.objects.register(TrackedObject::Callback(Arc::new(NoopCallback::default())));
        let unrelated = bridge.objects.register(TrackedObject::Callback(Arc::new(NoopCallback::default())));
        let channel = bridge.browser_channel(1, HandlerMask::REQUEST);
        channel.bind(browser);
        channel.emit(BrowserEvent::BeforeResourceLoad {
            request: Arc::new(crate::engine::headless::HeadlessRequest::new("https://example.com", "GET")),
            callback: Arc::new(NoopCallback::default()),
        });
        let (_, request, callback): (u64, u64, u64) =
            recorder.wait_for(methods::ON_BEFORE_RESOURCE_LOAD).decode_params().unwrap();
        let (request, callback) = (Handle::from_raw(request), Handle::from_raw(callback));
        assert!(bridge.objects.request(request).is_ok());

        channel.emit(BrowserEvent::BeforeClose);
        recorder.wait_for(methods::ON_BEFORE_CLOSE);
        assert!(bridge.objects.resolve(browser).is_err());
        assert!(bridge.objects.resolve(request).is_err());
        assert!(bridge.objects.resolve(callback).is_err());
        assert!(bridge.objects.resolve(unrelated).is_ok());
    }

    #[test]
    fn test_attach_failure_reports_error() {
        let bridge = bridge();
        let dir = tempfile::tempdir().unwrap();
        let missing = Endpoint::Pipe(dir.path().join("nobody-listens"));
        assert!(bridge.attach(1, &missing).is_err());
        assert!(!bridge.has_live_channel(1));
    }
}
