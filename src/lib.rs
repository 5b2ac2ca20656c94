//! Browser Bridge - remote control of a single-threaded browser engine
//!
//! This library exposes a browser engine, which must only be touched from its own
//! thread, to out-of-process clients over a length-prefixed MessagePack RPC:
//! - Clients name engine objects through opaque generation-tagged [`Handle`]s
//! - Every engine call is marshalled onto the engine thread by the [`Dispatcher`]
//! - Engine events travel back over a second connection opened to the client
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use browser_bridge::{Bridge, BridgeConfig, EngineSettings, SessionFactory, build_router};
//! use browser_bridge::engine::{TaskQueue, TaskRunner, headless::HeadlessEngine};
//! use browser_bridge::ipc::Server;
//!
//! fn serve() -> browser_bridge::Result<()> {
//!     let config = BridgeConfig::builder().tcp_port(9000).build()?;
//!     let (queue, engine_loop) = TaskQueue::new();
//!     let runner: Arc<dyn TaskRunner> = Arc::new(queue);
//!     let engine = HeadlessEngine::init(EngineSettings::default(), runner.clone())?;
//!
//!     let bridge = Bridge::init(config, engine, runner, browser_bridge::platform::native_translator());
//!     let server = Server::start(bridge.config().endpoint(), SessionFactory::new(bridge.clone(), build_router()))?;
//!
//!     // the engine owns the main thread until a client calls `stop`
//!     engine_loop.run();
//!
//!     bridge.shutdown();
//!     server.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Backward channel
//!
//! After `connect`/`connectTcp`, the bridge connects back to the callback
//! server named by the client and calls methods such as `onAfterCreated` or
//! `getAuthCredentials` on it. See [`callback`] for the routing rules.

mod bridge;
pub mod callback;
pub mod commands;
mod config;
mod dispatcher;
pub mod engine;
mod error;
mod handle;
pub mod input;
pub mod ipc;
pub mod platform;
mod session;

pub use bridge::Bridge;
pub use callback::{CallbackBridge, Role};
pub use commands::build_router;
pub use config::{
    BridgeConfig, BridgeConfigBuilder, DEFAULT_BACKWARD_CONNECT_TIMEOUT, DEFAULT_OUTBOX_CAPACITY,
    EngineSettings, EngineSettingsBuilder,
};
pub use dispatcher::{DEFAULT_SYNC_TIMEOUT, Dispatcher};
pub use error::{BridgeError, ErrorCode, RemoteError, Result};
pub use handle::{Handle, ObjectKind, ObjectTable, TrackedObject};
/// Re-export rmp_serde for clients encoding positional parameters.
pub use rmp_serde;
pub use session::{ConnectionState, Session, SessionFactory};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::Duration;

    use super::*;
    use crate::callback::methods;
    use crate::callback::testing::Recorder;
    use crate::engine::headless::HeadlessEngine;
    use crate::engine::{HandlerMask, TaskQueue, TaskRunner};
    use crate::ipc::{Client, Endpoint, Server};
    use crate::platform::native_translator;

    const NO_ARGS: [u8; 0] = [];

    /// Bridge served over loopback TCP, engine on its own thread
    struct Fixture {
        bridge: Arc<Bridge>,
        server: Server<SessionFactory>,
        engine_thread: Option<JoinHandle<()>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(BridgeConfig::default(), EngineSettings::default())
        }

        fn with_config(config: BridgeConfig, settings: EngineSettings) -> Self {
            let (queue, engine_loop) = TaskQueue::new();
            let runner: Arc<dyn TaskRunner> = Arc::new(queue);
            let engine = HeadlessEngine::init(settings, Arc::clone(&runner)).unwrap();
            let engine_thread = engine_loop.spawn().unwrap();
            let bridge = Bridge::init(config, engine, runner, native_translator());
            let server = Server::start(
                &Endpoint::Tcp(0),
                SessionFactory::new(Arc::clone(&bridge), build_router()),
            )
            .unwrap();
            Self {
                bridge,
                server,
                engine_thread: Some(engine_thread),
            }
        }

        fn client(&self) -> Client {
            let client = Client::connect(self.server.endpoint(), Duration::from_secs(2)).unwrap();
            client.set_reply_timeout(Some(Duration::from_secs(5))).unwrap();
            client
        }

        /// Client negotiated against a fresh callback server
        fn session(&self, master: bool) -> (Client, Recorder, Server<Recorder>) {
            let recorder = Recorder::default();
            let callbacks = Server::start(&Endpoint::Tcp(0), recorder.clone()).unwrap();
            let mut client = self.client();
            let id: i32 = client.call("connectTcp", &(port(callbacks.endpoint()), master)).unwrap();
            assert!(id > 0);
            (client, recorder, callbacks)
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.server.stop();
            self.bridge.request_stop();
            if let Some(engine_thread) = self.engine_thread.take() {
                engine_thread.join().unwrap();
            }
            self.bridge.shutdown();
        }
    }

    fn port(endpoint: &Endpoint) -> i32 {
        match endpoint {
            Endpoint::Tcp(port) => i32::from(*port),
            Endpoint::Pipe(path) => panic!("expected a TCP endpoint, got {}", path.display()),
        }
    }

    fn error_code<T: std::fmt::Debug>(result: Result<T>) -> ErrorCode {
        match result {
            Err(BridgeError::Remote(remote)) => remote.code,
            other => panic!("expected an error reply, got {other:?}"),
        }
    }

    fn eventually(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_browser_creation_round_trip() {
        let fixture = Fixture::new();
        let (mut client, recorder, _callbacks) = fixture.session(true);

        let browser: u64 = client.call("createBrowser", &(1, 0u32)).unwrap();
        client
            .call::<_, ()>("startBrowserCreation", &(browser, "https://example.com"))
            .unwrap();

        let (created,): (u64,) = recorder.wait_for(methods::ON_AFTER_CREATED).decode_params().unwrap();
        assert_eq!(created, browser);
        let url: String = client.call("Browser_GetURL", &(browser,)).unwrap();
        assert_eq!(url, "https://example.com");

        let frame: u64 = client.call("Browser_GetMainFrame", &(browser,)).unwrap();
        assert_ne!(frame, 0);
        let frame_url: String = client.call("Frame_GetURL", &(frame,)).unwrap();
        assert_eq!(frame_url, "https://example.com");
        client.call::<_, ()>("Frame_Dispose", &(frame,)).unwrap();
        assert_eq!(error_code(client.call::<_, String>("Frame_GetURL", &(frame,))), ErrorCode::InvalidHandle);

        // no LOAD handler: load events never reach the client
        assert!(!recorder.methods().iter().any(|m| m == methods::ON_LOAD_END));

        client.call::<_, ()>("closeBrowser", &(browser,)).unwrap();
        recorder.wait_for(methods::ON_BEFORE_CLOSE);
        assert!(eventually(|| fixture.bridge.objects().resolve(Handle::from_raw(browser)).is_err()));
        assert_eq!(
            error_code(client.call::<_, String>("Browser_GetURL", &(browser,))),
            ErrorCode::InvalidHandle
        );
    }

    #[test]
    fn test_message_router_lifecycle() {
        let fixture = Fixture::new();
        let (mut client, _recorder, _callbacks) = fixture.session(true);

        let browser: u64 = client.call("createBrowser", &(1, 0u32)).unwrap();
        let router: u64 = client.call("MessageRouter_Create", &("query", "cancel")).unwrap();
        client
            .call::<_, ()>("MessageRouter_AddMessageRouterToBrowser", &(router, browser))
            .unwrap();
        assert!(client.call::<_, bool>("MessageRouter_AddHandler", &(router, 7, false)).unwrap());
        assert!(!client.call::<_, bool>("MessageRouter_AddHandler", &(router, 7, true)).unwrap());
        client
            .call::<_, ()>("MessageRouter_RemoveMessageRouterFromBrowser", &(router, browser))
            .unwrap();
        client
            .call::<_, ()>("MessageRouter_CancelPending", &(router, 0u64, Option::<i32>::None))
            .unwrap();

        client.call::<_, ()>("MessageRouter_Dispose", &(router,)).unwrap();
        assert_eq!(
            error_code(client.call::<_, bool>("MessageRouter_RemoveHandler", &(router, 7))),
            ErrorCode::InvalidHandle
        );
    }

    #[test]
    fn test_router_with_identical_functions_is_not_registered() {
        let fixture = Fixture::new();
        let (mut client, _recorder, _callbacks) = fixture.session(false);
        let before = fixture.bridge.objects().len();

        let result = client.call::<_, u64>("MessageRouter_Create", &("same", "same"));
        assert_eq!(error_code(result), ErrorCode::ConstructionFailure);
        assert_eq!(fixture.bridge.objects().len(), before);
    }

    #[test]
    fn test_disposed_callback_is_rejected() {
        let fixture = Fixture::new();
        let (mut client, recorder, _callbacks) = fixture.session(true);
        let mut other = fixture.client();

        let handlers = HandlerMask::REQUEST | HandlerMask::DISPLAY;
        let browser: u64 = client.call("createBrowser", &(1, handlers)).unwrap();
        client
            .call::<_, ()>("startBrowserCreation", &(browser, "https://example.com/page"))
            .unwrap();

        let (_, request, callback): (u64, u64, u64) =
            recorder.wait_for(methods::ON_BEFORE_RESOURCE_LOAD).decode_params().unwrap();
        client
            .call::<_, ()>("Request_SetHeaderByName", &(request, "X-Trace", "1", true))
            .unwrap();
        let trace: String = client.call("Request_GetHeaderByName", &(request, "x-trace")).unwrap();
        assert_eq!(trace, "1");
        client.call::<_, ()>("Callback_Continue", &(callback,)).unwrap();
        let (_, address): (u64, String) = recorder.wait_for(methods::ON_ADDRESS_CHANGE).decode_params().unwrap();
        assert_eq!(address, "https://example.com/page");

        client.call::<_, ()>("Callback_Dispose", &(callback,)).unwrap();
        assert_eq!(
            error_code(client.call::<_, ()>("Callback_Continue", &(callback,))),
            ErrorCode::InvalidHandle
        );
        assert_eq!(
            error_code(client.call::<_, ()>("Callback_Continue", &(browser,))),
            ErrorCode::WrongObjectKind
        );

        // the failure stays on its request
        let echoed: String = other.call("echo", &("still here",)).unwrap();
        assert_eq!(echoed, "still here");
        let url: String = client.call("Browser_GetURL", &(browser,)).unwrap();
        assert_eq!(url, "https://example.com/page");
    }

    #[test]
    fn test_dispose_twice_succeeds() {
        let fixture = Fixture::new();
        let (mut client, recorder, _callbacks) = fixture.session(true);

        let browser: u64 = client.call("createBrowser", &(1, HandlerMask::REQUEST)).unwrap();
        client
            .call::<_, ()>("startBrowserCreation", &(browser, "https://example.com"))
            .unwrap();
        let (_, _request, callback): (u64, u64, u64) =
            recorder.wait_for(methods::ON_BEFORE_RESOURCE_LOAD).decode_params().unwrap();

        client.call::<_, ()>("Callback_Dispose", &(callback,)).unwrap();
        client.call::<_, ()>("Callback_Dispose", &(callback,)).unwrap();
        // a live handle of another kind is still refused
        assert_eq!(
            error_code(client.call::<_, ()>("Callback_Dispose", &(browser,))),
            ErrorCode::WrongObjectKind
        );

        let router: u64 = client.call("MessageRouter_Create", &("query", "cancel")).unwrap();
        client.call::<_, ()>("MessageRouter_Dispose", &(router,)).unwrap();
        client.call::<_, ()>("MessageRouter_Dispose", &(router,)).unwrap();
        assert!(fixture.bridge.objects().resolve(Handle::from_raw(router)).is_err());
    }

    #[test]
    fn test_frame_handle_follows_browser() {
        let fixture = Fixture::new();
        let (mut client, recorder, _callbacks) = fixture.session(true);

        let browser: u64 = client.call("createBrowser", &(1, 0u32)).unwrap();
        client
            .call::<_, ()>("startBrowserCreation", &(browser, "https://example.com"))
            .unwrap();
        recorder.wait_for(methods::ON_AFTER_CREATED);

        let frame: u64 = client.call("Browser_GetMainFrame", &(browser,)).unwrap();
        let live = fixture.bridge.objects().len();
        for _ in 0..10 {
            let again: u64 = client.call("Browser_GetMainFrame", &(browser,)).unwrap();
            assert_eq!(again, frame);
        }
        assert_eq!(fixture.bridge.objects().len(), live);

        client.call::<_, ()>("closeBrowser", &(browser,)).unwrap();
        recorder.wait_for(methods::ON_BEFORE_CLOSE);
        assert!(eventually(|| fixture.bridge.objects().is_empty()));
        assert_eq!(
            error_code(client.call::<_, String>("Frame_GetURL", &(frame,))),
            ErrorCode::InvalidHandle
        );
    }

    #[test]
    fn test_late_browser_is_closed() {
        let config = BridgeConfig::builder()
            .sync_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let fixture = Fixture::with_config(config, EngineSettings::builder().max_browsers(1).build());
        let (mut client, _recorder, _callbacks) = fixture.session(true);

        for _ in 0..3 {
            // keep the engine busy past the caller's wait
            fixture
                .bridge
                .dispatcher()
                .post_async(|| std::thread::sleep(Duration::from_millis(200)))
                .unwrap();
            assert_eq!(
                error_code(client.call::<_, u64>("createBrowser", &(1, 0u32))),
                ErrorCode::EngineTimeout
            );
            fixture
                .bridge
                .dispatcher()
                .post_sync_with(Duration::from_secs(2), || ())
                .unwrap();
            assert_eq!(fixture.bridge.engine().browser_count(), 0);
            assert!(fixture.bridge.objects().is_empty());
        }

        // the limit was never used up
        let browser: u64 = client.call("createBrowser", &(1, 0u32)).unwrap();
        assert_ne!(browser, 0);
        assert_eq!(fixture.bridge.engine().browser_count(), 1);
    }

    #[test]
    fn test_pending_call_survives_other_disconnect() {
        let fixture = Fixture::new();
        let (mut owner, _recorder, _callbacks) = fixture.session(true);
        let (mut waiting, _other_recorder, _other_callbacks) = fixture.session(false);

        let browser: u64 = owner.call("createBrowser", &(1, 0u32)).unwrap();
        owner
            .call::<_, ()>("startBrowserCreation", &(browser, "https://example.com"))
            .unwrap();

        fixture
            .bridge
            .dispatcher()
            .post_async(|| std::thread::sleep(Duration::from_millis(300)))
            .unwrap();
        let pending = std::thread::spawn(move || waiting.call::<_, String>("Browser_GetURL", &(browser,)));
        std::thread::sleep(Duration::from_millis(50));

        owner.close();
        assert!(eventually(|| fixture.bridge.connection_count() == 1));
        assert_eq!(pending.join().unwrap().unwrap(), "https://example.com");
        assert!(fixture.bridge.objects().browser(Handle::from_raw(browser)).is_ok());
    }

    #[test]
    fn test_methods_need_negotiation() {
        let fixture = Fixture::new();
        let mut client = fixture.client();

        let version: String = client.call("version", &NO_ARGS).unwrap();
        assert!(version.starts_with(env!("CARGO_PKG_VERSION")));
        assert_eq!(
            error_code(client.call::<_, u64>("createBrowser", &(1, 0u32))),
            ErrorCode::NotConnected
        );
        assert_eq!(error_code(client.call::<_, ()>("Browser_Fly", &(1u64,))), ErrorCode::UnknownMethod);
        assert_eq!(error_code(client.call::<_, String>("echo", &(42,))), ErrorCode::BadParams);

        // still usable after the errors
        let echoed: String = client.call("echo", &("hi",)).unwrap();
        assert_eq!(echoed, "hi");
    }

    #[test]
    fn test_failed_backward_channel_keeps_session_active() {
        let fixture = Fixture::new();
        let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead_port = i32::from(unused.local_addr().unwrap().port());
        drop(unused);

        let mut client = fixture.client();
        let id: i32 = client.call("connectTcp", &(dead_port, false)).unwrap();
        assert_eq!(id, -1);

        let browser: u64 = client.call("createBrowser", &(1, 0u32)).unwrap();
        client.call::<_, ()>("startBrowserCreation", &(browser, "https://example.com")).unwrap();
        let url: String = client.call("Browser_GetURL", &(browser,)).unwrap();
        assert_eq!(url, "https://example.com");

        // connecting again replaces the dead channel
        let recorder = Recorder::default();
        let callbacks = Server::start(&Endpoint::Tcp(0), recorder.clone()).unwrap();
        let id: i32 = client.call("connectTcp", &(port(callbacks.endpoint()), false)).unwrap();
        assert!(id > 0);
        client.call::<_, ()>("Browser_LoadURL", &(browser, "https://example.org")).unwrap();
        client.call::<_, ()>("closeBrowser", &(browser,)).unwrap();
        recorder.wait_for(methods::ON_BEFORE_CLOSE);
    }

    #[test]
    fn test_handles_outlive_their_connection() {
        let fixture = Fixture::new();
        let (mut first, _recorder, _callbacks) = fixture.session(true);
        let (mut second, _other_recorder, _other_callbacks) = fixture.session(false);

        let browser: u64 = first.call("createBrowser", &(1, 0u32)).unwrap();
        first
            .call::<_, ()>("startBrowserCreation", &(browser, "https://example.com"))
            .unwrap();
        first.close();
        assert!(eventually(|| fixture.bridge.connection_count() == 1));

        let url: String = second.call("Browser_GetURL", &(browser,)).unwrap();
        assert_eq!(url, "https://example.com");
        assert_eq!(fixture.bridge.callbacks().master(), None);
    }

    #[test]
    fn test_state_reports_session() {
        let fixture = Fixture::new();
        let (mut client, _recorder, _callbacks) = fixture.session(true);
        let _browser: u64 = client.call("createBrowser", &(1, 0u32)).unwrap();

        let state: String = client.call("state", &NO_ARGS).unwrap();
        let state: serde_json::Value = serde_json::from_str(&state).unwrap();
        assert_eq!(state["handles"]["browser"], 1);
        assert_eq!(state["engine"]["browsers"], 1);
        assert_eq!(state["session"]["state"], "Active");
        assert_eq!(state["session"]["role"], "Master");
    }

    #[test]
    fn test_stop_replies_then_quits() {
        let fixture = Fixture::new();
        let (_master, recorder, _callbacks) = fixture.session(true);
        let (mut client, _other_recorder, _other_callbacks) = fixture.session(false);

        client.call::<_, ()>("stop", &NO_ARGS).unwrap();
        assert!(fixture.bridge.wait_for_stop(Duration::from_secs(2)));
        assert!(fixture.bridge.is_stopping());

        fixture.bridge.shutdown();
        recorder.wait_for(methods::ON_SERVER_SHUTDOWN);
    }
}
