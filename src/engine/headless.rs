//! In-process engine without rendering
//!
//! Keeps the observable state of each browser (history, loading, zoom, IME
//! composition, downloads, message-router queries) and produces the same
//! events a rendering engine would. Every method runs on the engine thread;
//! follow-up steps such as load completion are posted back onto the queue so
//! they arrive asynchronously.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::config::EngineSettings;
use crate::engine::{
    AuthCallback, Browser, BrowserEvent, BrowserOptions, Callback, ClientObjectId, Engine,
    EventSink, Frame, HandlerMask, HeaderMap, MessageRouter, PostData, QueryCallback, Range,
    Request, Response, RouterConfig, TaskRunner,
};
use crate::error::{BridgeError, Result};
use crate::input::{KeyEvent, MouseEvent, WheelEvent};

/// Navigation was cancelled
pub const ERR_ABORTED: i32 = -3;
/// Credentials were refused
pub const ERR_INVALID_AUTH_CREDENTIALS: i32 = -338;

/// Paths under this prefix answer with an auth challenge until credentials are given
pub const PROTECTED_PREFIX: &str = "/protected";

const AUTH_REALM: &str = "headless";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn utf16_len(text: &str) -> i32 {
    text.encode_utf16().count() as i32
}

/// Engine simulating browsers on the engine thread
pub struct HeadlessEngine {
    runner: Arc<dyn TaskRunner>,
    settings: EngineSettings,
    next_browser_id: AtomicI32,
    live_browsers: Arc<AtomicUsize>,
}

impl HeadlessEngine {
    /// Prepare the engine; fails if the cache directory cannot be created
    pub fn init(settings: EngineSettings, runner: Arc<dyn TaskRunner>) -> Result<Arc<Self>> {
        if let Some(path) = settings.cache_path() {
            std::fs::create_dir_all(path).map_err(|e| {
                BridgeError::EngineInit(format!(
                    "cannot create cache directory {}: {e}",
                    path.display()
                ))
            })?;
        }

        tracing::info!(cache = ?settings.cache_path(), "headless engine initialized");

        Ok(Arc::new(Self {
            runner,
            settings,
            next_browser_id: AtomicI32::new(1),
            live_browsers: Arc::new(AtomicUsize::new(0)),
        }))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// [`Engine::create_browser`] keeping the concrete type
    pub fn create_headless_browser(
        &self,
        options: BrowserOptions,
        events: EventSink,
    ) -> Result<Arc<HeadlessBrowser>> {
        let live = self.live_browsers.load(Ordering::SeqCst);
        if live >= self.settings.max_browsers() {
            return Err(BridgeError::Construction(format!(
                "browser limit of {} reached",
                self.settings.max_browsers()
            )));
        }

        let id = self.next_browser_id.fetch_add(1, Ordering::SeqCst);
        self.live_browsers.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(browser = id, client_id = options.client_id, "browser created");

        Ok(HeadlessBrowser::new(
            id,
            options,
            events,
            Arc::clone(&self.runner),
            self.settings.clone(),
            Arc::clone(&self.live_browsers),
        ))
    }
}

impl Engine for HeadlessEngine {
    fn version(&self) -> String {
        format!("headless {}", env!("CARGO_PKG_VERSION"))
    }

    fn create_browser(&self, options: BrowserOptions, events: EventSink) -> Result<Arc<dyn Browser>> {
        let browser = self.create_headless_browser(options, events)?;
        Ok(browser)
    }

    fn create_message_router(&self, config: RouterConfig) -> Result<Arc<dyn MessageRouter>> {
        let valid = |name: &str| {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        };
        if !valid(&config.query_function) || !valid(&config.cancel_function) {
            return Err(BridgeError::Construction(format!(
                "invalid router function names: {:?}, {:?}",
                config.query_function, config.cancel_function
            )));
        }
        if config.query_function == config.cancel_function {
            return Err(BridgeError::Construction(
                "query and cancel functions must differ".to_string(),
            ));
        }
        Ok(HeadlessMessageRouter::new(config))
    }

    fn browser_count(&self) -> usize {
        self.live_browsers.load(Ordering::SeqCst)
    }
}

/// How many input events a browser has received
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputCounts {
    pub keys: u32,
    pub mouse: u32,
    pub wheel: u32,
}

#[derive(Default)]
struct BrowserState {
    started: bool,
    closed: bool,
    history: Vec<String>,
    position: usize,
    loading: bool,
    // bumped on every load start or abort so stale completions are ignored
    load_seq: u64,
    zoom: f64,
    focused: bool,
    frame_rate: i32,
    composition: Option<String>,
    committed_text: String,
    authorized_hosts: HashSet<String>,
    routers: Vec<Arc<dyn MessageRouter>>,
    next_download: u32,
    find_text: Option<String>,
    input: InputCounts,
}

impl BrowserState {
    fn current_url(&self) -> Option<String> {
        self.history.get(self.position).cloned()
    }
}

/// Simulated browser
pub struct HeadlessBrowser {
    id: i32,
    options: BrowserOptions,
    events: EventSink,
    runner: Arc<dyn TaskRunner>,
    settings: EngineSettings,
    live_browsers: Arc<AtomicUsize>,
    this: Weak<HeadlessBrowser>,
    main_frame: Arc<HeadlessFrame>,
    state: Mutex<BrowserState>,
}

impl HeadlessBrowser {
    fn new(
        id: i32,
        options: BrowserOptions,
        events: EventSink,
        runner: Arc<dyn TaskRunner>,
        settings: EngineSettings,
        live_browsers: Arc<AtomicUsize>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            options,
            events,
            runner,
            settings,
            live_browsers,
            this: this.clone(),
            main_frame: Arc::new(HeadlessFrame {
                browser: this.clone(),
                identifier: format!("{id}-main"),
            }),
            state: Mutex::new(BrowserState {
                frame_rate: 30,
                ..BrowserState::default()
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, BrowserState> {
        lock(&self.state)
    }

    pub fn options(&self) -> BrowserOptions {
        self.options
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn is_focused(&self) -> bool {
        self.state().focused
    }

    pub fn frame_rate(&self) -> i32 {
        self.state().frame_rate
    }

    pub fn input_counts(&self) -> InputCounts {
        self.state().input
    }

    /// Text committed through the IME so far
    pub fn committed_text(&self) -> String {
        self.state().committed_text.clone()
    }

    pub fn find_text(&self) -> Option<String> {
        self.state().find_text.clone()
    }

    fn emit(&self, event: BrowserEvent) {
        tracing::trace!(browser = self.id, event = event.name(), "browser event");
        self.events.emit(event);
    }

    /// Run `step` later on the engine thread, if the browser is still alive
    fn post<F>(&self, step: F)
    where
        F: FnOnce(&HeadlessBrowser) + Send + 'static,
    {
        let this = self.this.clone();
        let posted = self.runner.post(Box::new(move || {
            if let Some(browser) = this.upgrade() {
                step(&browser);
            }
        }));
        if !posted {
            tracing::debug!(browser = self.id, "engine stopped, dropping browser task");
        }
    }

    fn navigate(&self, url: String) {
        let target = Target::parse(&url);
        {
            let state = self.state();
            if state.closed {
                return;
            }
            if target.protected && !state.authorized_hosts.contains(&target.host) {
                drop(state);
                self.request_auth(url, target);
                return;
            }
        }
        self.intercept(url);
    }

    fn request_auth(&self, url: String, target: Target) {
        let callback = Arc::new(HeadlessAuthCallback {
            continuation: Continuation::new(self),
            url,
            host: target.host.clone(),
        });
        self.emit(BrowserEvent::AuthRequested {
            callback,
            host: target.host,
            port: target.port,
            realm: AUTH_REALM.to_string(),
        });
    }

    fn intercept(&self, url: String) {
        if !self.options.handlers.contains(HandlerMask::REQUEST) {
            self.commit(url, true, None);
            return;
        }
        let request = Arc::new(HeadlessRequest::new(&url, "GET"));
        let callback = Arc::new(ResourceLoadCallback {
            continuation: Continuation::new(self),
            request: Arc::clone(&request),
        });
        self.emit(BrowserEvent::BeforeResourceLoad { request, callback });
    }

    fn commit(&self, url: String, push: bool, request: Option<Arc<HeadlessRequest>>) {
        let seq = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            if push {
                let keep = if state.history.is_empty() { 0 } else { state.position + 1 };
                state.history.truncate(keep);
                state.history.push(url.clone());
                state.position = state.history.len() - 1;
            }
            state.loading = true;
            state.load_seq += 1;
            state.load_seq
        };

        self.emit(BrowserEvent::AddressChange { url: url.clone() });
        if let Some(request) = request {
            self.emit(BrowserEvent::ResourceResponse {
                request,
                response: Arc::new(HeadlessResponse::for_document()),
            });
        }
        self.post(move |browser| browser.finish_load(seq));
    }

    fn finish_load(&self, seq: u64) {
        {
            let mut state = self.state();
            if state.closed || !state.loading || state.load_seq != seq {
                return;
            }
            state.loading = false;
        }
        self.emit(BrowserEvent::LoadEnd { http_status: 200 });
    }

    fn fail_load(&self, url: String, code: i32, text: &str) {
        {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.loading = false;
            state.load_seq += 1;
        }
        self.emit(BrowserEvent::LoadError {
            code,
            text: text.to_string(),
            url,
        });
    }

    fn go_to(&self, offset: isize) {
        let url = {
            let mut state = self.state();
            let Some(position) = state.position.checked_add_signed(offset) else {
                return;
            };
            if state.closed || position >= state.history.len() {
                return;
            }
            state.position = position;
            state.current_url()
        };
        if let Some(url) = url {
            self.commit(url, false, None);
        }
    }

    fn reload_current(&self) {
        let url = self.state().current_url();
        if let Some(url) = url {
            self.commit(url, false, None);
        }
    }

    fn download_step(&self, id: u32, url: String, step: u32) {
        if self.is_closed() {
            return;
        }
        let steps = self.settings.download_steps();
        let total = self.settings.download_size();
        let received = total * i64::from(step) / i64::from(steps);
        let complete = step >= steps;

        self.emit(BrowserEvent::DownloadUpdated {
            id,
            url: url.clone(),
            received,
            total,
            complete,
        });
        if !complete {
            self.post(move |browser| browser.download_step(id, url, step + 1));
        }
    }

    fn page_source(&self) -> String {
        let url = self.url();
        format!("<html><head><title>{url}</title></head><body>{url}</body></html>")
    }

    fn composition_changed(&self, range: Range) {
        self.emit(BrowserEvent::ImeCompositionRangeChanged { range });
    }
}

impl Browser for HeadlessBrowser {
    fn identifier(&self) -> i32 {
        self.id
    }

    fn start(&self, url: &str) {
        {
            let mut state = self.state();
            if state.started || state.closed {
                tracing::warn!(browser = self.id, "browser creation already started");
                return;
            }
            state.started = true;
        }
        self.emit(BrowserEvent::AfterCreated);
        self.navigate(url.to_string());
    }

    fn close(&self, force: bool) {
        let routers = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.loading = false;
            std::mem::take(&mut state.routers)
        };
        tracing::debug!(browser = self.id, force, "browser closing");

        for router in routers {
            router.cancel_pending(Some(self.id), None);
        }
        self.live_browsers.fetch_sub(1, Ordering::SeqCst);
        self.post(|browser| browser.emit(BrowserEvent::BeforeClose));
    }

    fn reload(&self) {
        self.reload_current();
    }

    fn reload_ignore_cache(&self) {
        self.reload_current();
    }

    fn load_url(&self, url: &str) {
        self.navigate(url.to_string());
    }

    fn url(&self) -> String {
        self.state().current_url().unwrap_or_default()
    }

    fn execute_javascript(&self, code: &str, script_url: &str, line: i32) {
        let Some(call) = PageCall::parse(code) else {
            tracing::trace!(browser = self.id, script_url, line, "script executed");
            return;
        };

        let routers = self.state().routers.clone();
        let mut handled = false;
        for router in routers {
            let config = router.config();
            if call.function == config.query_function {
                if router.route_query(self.id, &self.events, &call.argument, false) {
                    handled = true;
                    break;
                }
            } else if call.function == config.cancel_function {
                router.cancel_pending(Some(self.id), None);
                handled = true;
            }
        }
        if !handled {
            tracing::debug!(browser = self.id, function = %call.function, "page call not handled");
        }
    }

    fn can_go_back(&self) -> bool {
        let state = self.state();
        !state.history.is_empty() && state.position > 0
    }

    fn can_go_forward(&self) -> bool {
        let state = self.state();
        state.position + 1 < state.history.len()
    }

    fn go_back(&self) {
        self.go_to(-1);
    }

    fn go_forward(&self) {
        self.go_to(1);
    }

    fn is_loading(&self) -> bool {
        self.state().loading
    }

    fn stop_load(&self) {
        let url = {
            let mut state = self.state();
            if !state.loading {
                return;
            }
            state.loading = false;
            state.load_seq += 1;
            state.current_url().unwrap_or_default()
        };
        self.emit(BrowserEvent::LoadError {
            code: ERR_ABORTED,
            text: "ERR_ABORTED".to_string(),
            url,
        });
    }

    fn frame_count(&self) -> i32 {
        i32::from(self.has_document())
    }

    fn main_frame(&self) -> Option<Arc<dyn Frame>> {
        if !self.state().started {
            return None;
        }
        let frame: Arc<dyn Frame> = self.main_frame.clone();
        Some(frame)
    }

    fn is_popup(&self) -> bool {
        false
    }

    fn has_document(&self) -> bool {
        let state = self.state();
        state.started && !state.history.is_empty()
    }

    fn view_source(&self) {
        tracing::debug!(browser = self.id, url = %self.url(), "view source requested");
    }

    fn get_source(&self, visitor: ClientObjectId) {
        self.post(move |browser| {
            let text = browser.page_source();
            browser.emit(BrowserEvent::StringVisited { visitor, text });
        });
    }

    fn get_text(&self, visitor: ClientObjectId) {
        self.post(move |browser| {
            let text = browser.url();
            browser.emit(BrowserEvent::StringVisited { visitor, text });
        });
    }

    fn was_resized(&self) {
        tracing::trace!(browser = self.id, "resized");
    }

    fn notify_screen_info_changed(&self) {
        tracing::trace!(browser = self.id, "screen info changed");
    }

    fn set_focus(&self, focus: bool) {
        self.state().focused = focus;
    }

    fn zoom_level(&self) -> f64 {
        self.state().zoom
    }

    fn set_zoom_level(&self, level: f64) {
        if level.is_finite() {
            self.state().zoom = level;
        }
    }

    fn set_frame_rate(&self, fps: i32) {
        self.state().frame_rate = fps.clamp(1, 60);
    }

    fn send_key_event(&self, event: KeyEvent) {
        tracing::trace!(browser = self.id, ?event, "key event");
        self.state().input.keys += 1;
    }

    fn send_mouse_event(&self, event: MouseEvent) {
        tracing::trace!(browser = self.id, ?event, "mouse event");
        self.state().input.mouse += 1;
    }

    fn send_mouse_wheel_event(&self, event: WheelEvent) {
        tracing::trace!(browser = self.id, ?event, "wheel event");
        self.state().input.wheel += 1;
    }

    fn ime_set_composition(&self, text: &str, selection: Range) {
        tracing::trace!(browser = self.id, ?selection, "composition updated");
        self.state().composition = Some(text.to_string());
        self.composition_changed(Range {
            from: 0,
            to: utf16_len(text),
        });
    }

    fn ime_commit_text(&self, text: &str) {
        let end = {
            let mut state = self.state();
            state.composition = None;
            state.committed_text.push_str(text);
            utf16_len(&state.committed_text)
        };
        self.composition_changed(Range { from: end, to: end });
    }

    fn ime_finish_composing_text(&self, keep_selection: bool) {
        let end = {
            let mut state = self.state();
            let Some(text) = state.composition.take() else {
                return;
            };
            state.committed_text.push_str(&text);
            utf16_len(&state.committed_text)
        };
        tracing::trace!(browser = self.id, keep_selection, "composition finished");
        self.composition_changed(Range { from: end, to: end });
    }

    fn ime_cancel_composition(&self) {
        if self.state().composition.take().is_some() {
            self.composition_changed(Range::default());
        }
    }

    fn start_download(&self, url: &str) {
        let id = {
            let mut state = self.state();
            state.next_download += 1;
            state.next_download
        };
        let url = url.to_string();
        self.post(move |browser| browser.download_step(id, url, 0));
    }

    fn find(&self, text: &str, forward: bool, match_case: bool, find_next: bool) {
        tracing::trace!(browser = self.id, forward, match_case, find_next, "find");
        self.state().find_text = Some(text.to_string());
    }

    fn stop_finding(&self, clear_selection: bool) {
        tracing::trace!(browser = self.id, clear_selection, "stop finding");
        self.state().find_text = None;
    }

    fn replace_misspelling(&self, word: &str) {
        tracing::trace!(browser = self.id, word, "replace misspelling");
    }

    fn add_message_router(&self, router: Arc<dyn MessageRouter>) {
        let mut state = self.state();
        if !state.routers.iter().any(|r| std::ptr::addr_eq(Arc::as_ptr(r), Arc::as_ptr(&router))) {
            state.routers.push(router);
        }
    }

    fn remove_message_router(&self, router: &Arc<dyn MessageRouter>) {
        let removed = {
            let mut state = self.state();
            let before = state.routers.len();
            state
                .routers
                .retain(|r| !std::ptr::addr_eq(Arc::as_ptr(r), Arc::as_ptr(router)));
            before != state.routers.len()
        };
        if removed {
            router.cancel_pending(Some(self.id), None);
        }
    }
}

/// URL pieces the engine cares about
struct Target {
    host: String,
    port: i32,
    protected: bool,
}

impl Target {
    fn parse(url: &str) -> Self {
        let (scheme, rest) = url.split_once("://").unwrap_or(("", url));
        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };
        let explicit = authority
            .rsplit_once(':')
            .and_then(|(host, port)| Some((host, port.parse::<i32>().ok()?)));
        let (host, port) =
            explicit.unwrap_or((authority, if scheme == "https" { 443 } else { 80 }));
        Self {
            host: host.to_string(),
            port,
            protected: path.starts_with(PROTECTED_PREFIX),
        }
    }
}

/// `name('argument')` as written by page scripts
#[derive(Debug, PartialEq)]
struct PageCall {
    function: String,
    argument: String,
}

impl PageCall {
    fn parse(code: &str) -> Option<Self> {
        let code = code.trim().trim_end_matches(';').trim_end();
        let open = code.find('(')?;
        let inner = code[open + 1..].strip_suffix(')')?.trim();
        let function = code[..open].trim();
        if function.is_empty() {
            return None;
        }
        let argument = ['\'', '"']
            .iter()
            .find_map(|quote| inner.strip_prefix(*quote)?.strip_suffix(*quote))
            .unwrap_or(inner);
        Some(Self {
            function: function.to_string(),
            argument: argument.to_string(),
        })
    }
}

/// One-shot resumption of a navigation step
struct Continuation {
    browser: Weak<HeadlessBrowser>,
    answered: AtomicBool,
}

impl Continuation {
    fn new(browser: &HeadlessBrowser) -> Self {
        Self {
            browser: browser.this.clone(),
            answered: AtomicBool::new(false),
        }
    }

    fn resume<F>(&self, step: F)
    where
        F: FnOnce(&HeadlessBrowser) + Send + 'static,
    {
        if self.answered.swap(true, Ordering::SeqCst) {
            tracing::debug!("callback already answered");
            return;
        }
        if let Some(browser) = self.browser.upgrade() {
            browser.post(step);
        }
    }
}

struct HeadlessAuthCallback {
    continuation: Continuation,
    url: String,
    host: String,
}

impl AuthCallback for HeadlessAuthCallback {
    fn proceed(&self, username: &str, _password: &str) {
        let url = self.url.clone();
        let host = self.host.clone();
        let accepted = !username.is_empty();
        self.continuation.resume(move |browser| {
            if accepted {
                browser.state().authorized_hosts.insert(host);
                browser.intercept(url);
            } else {
                browser.fail_load(url, ERR_INVALID_AUTH_CREDENTIALS, "ERR_INVALID_AUTH_CREDENTIALS");
            }
        });
    }

    fn cancel(&self) {
        let url = self.url.clone();
        self.continuation
            .resume(move |browser| browser.fail_load(url, ERR_ABORTED, "ERR_ABORTED"));
    }
}

struct ResourceLoadCallback {
    continuation: Continuation,
    request: Arc<HeadlessRequest>,
}

impl Callback for ResourceLoadCallback {
    fn proceed(&self) {
        let request = Arc::clone(&self.request);
        self.continuation.resume(move |browser| {
            let url = request.url();
            browser.commit(url, true, Some(request));
        });
    }

    fn cancel(&self) {
        let url = self.request.url();
        self.continuation
            .resume(move |browser| browser.fail_load(url, ERR_ABORTED, "ERR_ABORTED"));
    }
}

struct HeadlessFrame {
    browser: Weak<HeadlessBrowser>,
    identifier: String,
}

impl Frame for HeadlessFrame {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn name(&self) -> String {
        // main frames are unnamed
        String::new()
    }

    fn url(&self) -> String {
        self.browser.upgrade().map(|browser| browser.url()).unwrap_or_default()
    }
}

struct PendingQuery {
    browser: i32,
    handler: ClientObjectId,
    persistent: bool,
    events: EventSink,
}

#[derive(Default)]
struct RouterState {
    handlers: Vec<ClientObjectId>,
    pending: BTreeMap<i64, PendingQuery>,
    disposed: bool,
}

/// Message router matching page queries to client handlers
pub struct HeadlessMessageRouter {
    config: RouterConfig,
    this: Weak<HeadlessMessageRouter>,
    next_query: AtomicI64,
    state: Mutex<RouterState>,
}

impl HeadlessMessageRouter {
    fn new(config: RouterConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            this: this.clone(),
            next_query: AtomicI64::new(1),
            state: Mutex::new(RouterState::default()),
        })
    }

    /// Ids of queries still waiting for an answer
    pub fn pending_queries(&self) -> Vec<i64> {
        lock(&self.state).pending.keys().copied().collect()
    }

    pub fn handlers(&self) -> Vec<ClientObjectId> {
        lock(&self.state).handlers.clone()
    }

    fn answer(&self, query_id: i64, done: bool) -> bool {
        let mut state = lock(&self.state);
        let Some(query) = state.pending.get(&query_id) else {
            return false;
        };
        if done || !query.persistent {
            state.pending.remove(&query_id);
        }
        true
    }
}

impl MessageRouter for HeadlessMessageRouter {
    fn config(&self) -> RouterConfig {
        self.config.clone()
    }

    fn add_handler(&self, handler: ClientObjectId, first: bool) -> bool {
        let mut state = lock(&self.state);
        if state.disposed || state.handlers.contains(&handler) {
            return false;
        }
        if first {
            state.handlers.insert(0, handler);
        } else {
            state.handlers.push(handler);
        }
        true
    }

    fn remove_handler(&self, handler: ClientObjectId) -> bool {
        let removed = {
            let mut state = lock(&self.state);
            let before = state.handlers.len();
            state.handlers.retain(|h| *h != handler);
            before != state.handlers.len()
        };
        if removed {
            self.cancel_pending(None, Some(handler));
        }
        removed
    }

    fn cancel_pending(&self, browser: Option<i32>, handler: Option<ClientObjectId>) {
        let canceled: Vec<(i64, PendingQuery)> = {
            let mut state = lock(&self.state);
            let ids: Vec<i64> = state
                .pending
                .iter()
                .filter(|(_, query)| {
                    browser.is_none_or(|b| query.browser == b)
                        && handler.is_none_or(|h| query.handler == h)
                })
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| state.pending.remove(&id).map(|query| (id, query)))
                .collect()
        };

        for (query_id, query) in canceled {
            tracing::debug!(query_id, handler = query.handler.0, "query canceled");
            query.events.emit(BrowserEvent::QueryCanceled {
                handler: query.handler,
                query_id,
            });
        }
    }

    fn route_query(&self, browser: i32, events: &EventSink, request: &str, persistent: bool) -> bool {
        let (handler, query_id) = {
            let mut state = lock(&self.state);
            if state.disposed {
                return false;
            }
            let Some(&handler) = state.handlers.first() else {
                return false;
            };
            let query_id = self.next_query.fetch_add(1, Ordering::SeqCst);
            state.pending.insert(
                query_id,
                PendingQuery {
                    browser,
                    handler,
                    persistent,
                    events: Arc::clone(events),
                },
            );
            (handler, query_id)
        };

        let callback = Arc::new(HeadlessQueryCallback {
            router: self.this.clone(),
            query_id,
        });
        events.emit(BrowserEvent::Query {
            handler,
            query_id,
            request: request.to_string(),
            persistent,
            callback,
        });
        true
    }

    fn dispose(&self) {
        {
            let mut state = lock(&self.state);
            state.disposed = true;
            state.handlers.clear();
        }
        self.cancel_pending(None, None);
    }
}

struct HeadlessQueryCallback {
    router: Weak<HeadlessMessageRouter>,
    query_id: i64,
}

impl QueryCallback for HeadlessQueryCallback {
    fn success(&self, response: &str) {
        let answered = self
            .router
            .upgrade()
            .is_some_and(|router| router.answer(self.query_id, false));
        if answered {
            tracing::debug!(query_id = self.query_id, len = response.len(), "query answered");
        } else {
            tracing::debug!(query_id = self.query_id, "query no longer pending");
        }
    }

    fn failure(&self, code: i32, message: &str) {
        let answered = self
            .router
            .upgrade()
            .is_some_and(|router| router.answer(self.query_id, true));
        if answered {
            tracing::debug!(query_id = self.query_id, code, message, "query failed");
        }
    }
}

fn find_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

fn store_header(headers: &mut HeaderMap, name: &str, value: &str, overwrite: bool) {
    let existing = headers
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .cloned();
    match existing {
        Some(_) if !overwrite => {}
        Some(key) => {
            headers.remove(&key);
            headers.insert(name.to_string(), value.to_string());
        }
        None => {
            headers.insert(name.to_string(), value.to_string());
        }
    }
}

#[derive(Default)]
struct RequestData {
    url: String,
    method: String,
    headers: HeaderMap,
    post_data: Option<PostData>,
}

/// Request handed to the client during resource interception
pub struct HeadlessRequest {
    data: Mutex<RequestData>,
}

impl HeadlessRequest {
    pub fn new(url: &str, method: &str) -> Self {
        Self {
            data: Mutex::new(RequestData {
                url: url.to_string(),
                method: method.to_string(),
                ..RequestData::default()
            }),
        }
    }
}

impl Request for HeadlessRequest {
    fn url(&self) -> String {
        lock(&self.data).url.clone()
    }

    fn method(&self) -> String {
        lock(&self.data).method.clone()
    }

    fn header_map(&self) -> HeaderMap {
        lock(&self.data).headers.clone()
    }

    fn set_header_map(&self, headers: HeaderMap) {
        lock(&self.data).headers = headers;
    }

    fn header(&self, name: &str) -> String {
        find_header(&lock(&self.data).headers, name).unwrap_or_default()
    }

    fn set_header(&self, name: &str, value: &str, overwrite: bool) {
        store_header(&mut lock(&self.data).headers, name, value, overwrite);
    }

    fn post_data(&self) -> Option<PostData> {
        lock(&self.data).post_data.clone()
    }

    fn set_post_data(&self, post_data: PostData) {
        lock(&self.data).post_data = Some(post_data);
    }

    fn set(&self, url: &str, method: &str, post_data: Option<PostData>, headers: HeaderMap) {
        let mut data = lock(&self.data);
        data.url = url.to_string();
        data.method = method.to_string();
        data.post_data = post_data;
        data.headers = headers;
    }
}

struct ResponseData {
    status: i32,
    status_text: String,
    mime_type: String,
    headers: HeaderMap,
}

pub struct HeadlessResponse {
    data: Mutex<ResponseData>,
}

impl HeadlessResponse {
    /// `200 OK` for an HTML document
    pub fn for_document() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type".to_string(), "text/html".to_string());
        Self {
            data: Mutex::new(ResponseData {
                status: 200,
                status_text: "OK".to_string(),
                mime_type: "text/html".to_string(),
                headers,
            }),
        }
    }
}

impl Response for HeadlessResponse {
    fn status(&self) -> i32 {
        lock(&self.data).status
    }

    fn status_text(&self) -> String {
        lock(&self.data).status_text.clone()
    }

    fn mime_type(&self) -> String {
        lock(&self.data).mime_type.clone()
    }

    fn header_map(&self) -> HeaderMap {
        lock(&self.data).headers.clone()
    }

    fn set_header_map(&self, headers: HeaderMap) {
        lock(&self.data).headers = headers;
    }

    fn header(&self, name: &str) -> String {
        find_header(&lock(&self.data).headers, name).unwrap_or_default()
    }

    fn set_header(&self, name: &str, value: &str, overwrite: bool) {
        store_header(&mut lock(&self.data).headers, name, value, overwrite);
    }
}
