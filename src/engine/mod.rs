//! Engine-side object model
//!
//! The browser engine lives behind these traits. Everything here is called on the
//! engine thread only (through the [`Dispatcher`](crate::Dispatcher)), but the
//! objects are shared with RPC threads through the object table, hence the
//! `Send + Sync` bounds.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::input::{KeyEvent, MouseEvent, WheelEvent};

pub mod headless;
mod queue;

pub use queue::{EngineLoop, TaskQueue};

/// Unit of work executed on the engine thread
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The engine's "post task to engine thread" primitive
pub trait TaskRunner: Send + Sync {
    /// Queue a task. Returns `false` if the engine loop has stopped.
    fn post(&self, task: Task) -> bool;

    /// Whether the calling thread is the engine thread
    fn is_engine_thread(&self) -> bool;

    /// Ask the engine loop to exit after the tasks already queued
    fn quit(&self);
}

/// Identifier of an object living on the client side (handlers, visitors)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientObjectId(pub i32);

/// Which client-side handler groups a browser has
///
/// Events whose handler is not present are not sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerMask(pub u32);

impl HandlerMask {
    pub const NONE: HandlerMask = HandlerMask(0);
    /// Address and title changes
    pub const DISPLAY: HandlerMask = HandlerMask(1 << 0);
    /// Load completion and errors
    pub const LOAD: HandlerMask = HandlerMask(1 << 1);
    pub const DOWNLOAD: HandlerMask = HandlerMask(1 << 2);
    /// Auth challenges, resource loading and responses
    pub const REQUEST: HandlerMask = HandlerMask(1 << 3);
    /// IME composition updates
    pub const RENDER: HandlerMask = HandlerMask(1 << 4);

    pub fn contains(self, other: HandlerMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for HandlerMask {
    type Output = HandlerMask;

    fn bitor(self, rhs: HandlerMask) -> HandlerMask {
        HandlerMask(self.0 | rhs.0)
    }
}

/// Text range, in UTF-16 code units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Range {
    pub from: i32,
    pub to: i32,
}

/// Header name → value
pub type HeaderMap = BTreeMap<String, String>;

/// Request body
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostData {
    pub elements: Vec<PostDataElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostDataElement {
    Bytes(Vec<u8>),
    File(String),
}

/// Parameters of `createBrowser`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserOptions {
    pub client_id: i32,
    pub handlers: HandlerMask,
}

/// Names of the page functions a message router installs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub query_function: String,
    pub cancel_function: String,
}

/// Receiver of a browser's asynchronous events
pub trait BrowserEvents: Send + Sync {
    fn emit(&self, event: BrowserEvent);
}

pub type EventSink = Arc<dyn BrowserEvents>;

/// Event produced by the engine for one browser
pub enum BrowserEvent {
    AfterCreated,
    BeforeClose,
    AddressChange {
        url: String,
    },
    LoadEnd {
        http_status: i32,
    },
    LoadError {
        code: i32,
        text: String,
        url: String,
    },
    DownloadUpdated {
        id: u32,
        url: String,
        received: i64,
        total: i64,
        complete: bool,
    },
    ImeCompositionRangeChanged {
        range: Range,
    },
    AuthRequested {
        callback: Arc<dyn AuthCallback>,
        host: String,
        port: i32,
        realm: String,
    },
    BeforeResourceLoad {
        request: Arc<dyn Request>,
        callback: Arc<dyn Callback>,
    },
    ResourceResponse {
        request: Arc<dyn Request>,
        response: Arc<dyn Response>,
    },
    Query {
        handler: ClientObjectId,
        query_id: i64,
        request: String,
        persistent: bool,
        callback: Arc<dyn QueryCallback>,
    },
    QueryCanceled {
        handler: ClientObjectId,
        query_id: i64,
    },
    StringVisited {
        visitor: ClientObjectId,
        text: String,
    },
}

impl BrowserEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserEvent::AfterCreated => "after_created",
            BrowserEvent::BeforeClose => "before_close",
            BrowserEvent::AddressChange { .. } => "address_change",
            BrowserEvent::LoadEnd { .. } => "load_end",
            BrowserEvent::LoadError { .. } => "load_error",
            BrowserEvent::DownloadUpdated { .. } => "download_updated",
            BrowserEvent::ImeCompositionRangeChanged { .. } => "ime_composition_range_changed",
            BrowserEvent::AuthRequested { .. } => "auth_requested",
            BrowserEvent::BeforeResourceLoad { .. } => "before_resource_load",
            BrowserEvent::ResourceResponse { .. } => "resource_response",
            BrowserEvent::Query { .. } => "query",
            BrowserEvent::QueryCanceled { .. } => "query_canceled",
            BrowserEvent::StringVisited { .. } => "string_visited",
        }
    }

    /// Handler group the client must have for this event to be delivered
    ///
    /// `None` for events that are always delivered.
    pub fn required_handler(&self) -> Option<HandlerMask> {
        match self {
            BrowserEvent::AddressChange { .. } => Some(HandlerMask::DISPLAY),
            BrowserEvent::LoadEnd { .. } | BrowserEvent::LoadError { .. } => {
                Some(HandlerMask::LOAD)
            }
            BrowserEvent::DownloadUpdated { .. } => Some(HandlerMask::DOWNLOAD),
            BrowserEvent::AuthRequested { .. }
            | BrowserEvent::BeforeResourceLoad { .. }
            | BrowserEvent::ResourceResponse { .. } => Some(HandlerMask::REQUEST),
            BrowserEvent::ImeCompositionRangeChanged { .. } => Some(HandlerMask::RENDER),
            BrowserEvent::AfterCreated
            | BrowserEvent::BeforeClose
            | BrowserEvent::Query { .. }
            | BrowserEvent::QueryCanceled { .. }
            | BrowserEvent::StringVisited { .. } => None,
        }
    }
}

/// Engine entry point
pub trait Engine: Send + Sync {
    fn version(&self) -> String;

    /// Construct a browser. Navigation starts with [`Browser::start`].
    fn create_browser(&self, options: BrowserOptions, events: EventSink)
    -> Result<Arc<dyn Browser>>;

    fn create_message_router(&self, config: RouterConfig) -> Result<Arc<dyn MessageRouter>>;

    /// Number of browsers not yet closed
    fn browser_count(&self) -> usize;
}

pub trait Browser: Send + Sync {
    fn identifier(&self) -> i32;

    /// Begin the asynchronous part of creation and load `url`
    fn start(&self, url: &str);
    fn close(&self, force: bool);

    fn reload(&self);
    fn reload_ignore_cache(&self);
    fn load_url(&self, url: &str);
    fn url(&self) -> String;
    fn execute_javascript(&self, code: &str, script_url: &str, line: i32);
    fn can_go_back(&self) -> bool;
    fn can_go_forward(&self) -> bool;
    fn go_back(&self);
    fn go_forward(&self);
    fn is_loading(&self) -> bool;
    fn stop_load(&self);

    fn frame_count(&self) -> i32;
    fn main_frame(&self) -> Option<Arc<dyn Frame>>;
    fn is_popup(&self) -> bool;
    fn has_document(&self) -> bool;
    fn view_source(&self);
    fn get_source(&self, visitor: ClientObjectId);
    fn get_text(&self, visitor: ClientObjectId);

    fn was_resized(&self);
    fn notify_screen_info_changed(&self);
    fn set_focus(&self, focus: bool);
    fn zoom_level(&self) -> f64;
    fn set_zoom_level(&self, level: f64);
    fn set_frame_rate(&self, fps: i32);

    fn send_key_event(&self, event: KeyEvent);
    fn send_mouse_event(&self, event: MouseEvent);
    fn send_mouse_wheel_event(&self, event: WheelEvent);
    fn ime_set_composition(&self, text: &str, selection: Range);
    fn ime_commit_text(&self, text: &str);
    fn ime_finish_composing_text(&self, keep_selection: bool);
    fn ime_cancel_composition(&self);

    fn start_download(&self, url: &str);
    fn find(&self, text: &str, forward: bool, match_case: bool, find_next: bool);
    fn stop_finding(&self, clear_selection: bool);
    fn replace_misspelling(&self, word: &str);

    fn add_message_router(&self, router: Arc<dyn MessageRouter>);
    fn remove_message_router(&self, router: &Arc<dyn MessageRouter>);
}

pub trait Frame: Send + Sync {
    fn identifier(&self) -> String;
    fn name(&self) -> String;
    fn url(&self) -> String;
}

/// Generic continue/cancel callback
pub trait Callback: Send + Sync {
    fn proceed(&self);
    fn cancel(&self);
}

pub trait AuthCallback: Send + Sync {
    fn proceed(&self, username: &str, password: &str);
    fn cancel(&self);
}

/// Answer channel for one message-router query
pub trait QueryCallback: Send + Sync {
    fn success(&self, response: &str);
    fn failure(&self, code: i32, message: &str);
}

pub trait MessageRouter: Send + Sync {
    fn config(&self) -> RouterConfig;

    /// Returns `false` if the handler was already registered
    fn add_handler(&self, handler: ClientObjectId, first: bool) -> bool;

    /// Returns `false` if the handler was not registered
    fn remove_handler(&self, handler: ClientObjectId) -> bool;

    /// Cancel pending queries, optionally restricted to a browser and/or handler
    fn cancel_pending(&self, browser: Option<i32>, handler: Option<ClientObjectId>);

    /// Offer a page query to this router. Returns `true` if a handler took it.
    fn route_query(&self, browser: i32, events: &EventSink, request: &str, persistent: bool)
    -> bool;

    /// Detach from all browsers and cancel everything pending
    fn dispose(&self);
}

pub trait Request: Send + Sync {
    fn url(&self) -> String;
    fn method(&self) -> String;
    fn header_map(&self) -> HeaderMap;
    fn set_header_map(&self, headers: HeaderMap);
    fn header(&self, name: &str) -> String;
    fn set_header(&self, name: &str, value: &str, overwrite: bool);
    fn post_data(&self) -> Option<PostData>;
    fn set_post_data(&self, post_data: PostData);
    fn set(&self, url: &str, method: &str, post_data: Option<PostData>, headers: HeaderMap);
}

pub trait Response: Send + Sync {
    fn status(&self) -> i32;
    fn status_text(&self) -> String;
    fn mime_type(&self) -> String;
    fn header_map(&self) -> HeaderMap;
    fn set_header_map(&self, headers: HeaderMap);
    fn header(&self, name: &str) -> String;
    fn set_header(&self, name: &str, value: &str, overwrite: bool);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct NoopCallback {
        pub proceeded: AtomicUsize,
        pub canceled: AtomicUsize,
    }

    impl Callback for NoopCallback {
        fn proceed(&self) {
            self.proceeded.fetch_add(1, Ordering::SeqCst);
        }

        fn cancel(&self) {
            self.canceled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    pub struct NoopQueryCallback {
        pub answers: Mutex<Vec<String>>,
    }

    impl QueryCallback for NoopQueryCallback {
        fn success(&self, response: &str) {
            self.answers.lock().unwrap().push(response.to_string());
        }

        fn failure(&self, code: i32, message: &str) {
            self.answers.lock().unwrap().push(format!("{code}:{message}"));
        }
    }

    /// Sink that records event names
    #[derive(Default)]
    pub struct RecordingEvents {
        pub names: Mutex<Vec<&'static str>>,
        pub events: Mutex<Vec<BrowserEvent>>,
    }

    impl RecordingEvents {
        pub fn names(&self) -> Vec<&'static str> {
            self.names.lock().unwrap().clone()
        }
    }

    impl BrowserEvents for RecordingEvents {
        fn emit(&self, event: BrowserEvent) {
            self.names.lock().unwrap().push(event.name());
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_handler_mask_contains() {
        let mask = HandlerMask::LOAD | HandlerMask::REQUEST;
        assert!(mask.contains(HandlerMask::LOAD));
        assert!(mask.contains(HandlerMask::REQUEST));
        assert!(!mask.contains(HandlerMask::DISPLAY));
        assert!(mask.contains(HandlerMask::NONE));
    }
}
