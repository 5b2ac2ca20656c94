//! Browser lifecycle and `Browser_*` methods

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{engine_action, engine_getter};
use crate::engine::{Browser, BrowserOptions, ClientObjectId, EventSink, HandlerMask, Range};
use crate::error::Result;
use crate::handle::{Handle, TrackedObject};
use crate::input::{RawKeyEvent, RawMouseEvent, RawWheelEvent};
use crate::ipc::{Command, Router};
use crate::session::Session;

/// Create a browser owned by this session
///
/// The handle is registered only once the engine built the browser; events are
/// routed to this session's backward channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBrowser {
    pub client_id: i32,
    pub handlers: HandlerMask,
}

impl Command for CreateBrowser {
    const METHOD: &'static str = "createBrowser";
    type Reply = Handle;

    fn handle(self, session: &mut Session) -> Result<Handle> {
        let bridge = session.bridge();
        let channel = bridge.callbacks().browser_channel(session.id(), self.handlers);
        let sink: EventSink = channel.clone();
        let engine = Arc::clone(bridge.engine());
        let options = BrowserOptions {
            client_id: self.client_id,
            handlers: self.handlers,
        };

        let client_id = self.client_id;
        let browser = match bridge.dispatcher().post_sync_reclaim(
            move || engine.create_browser(options, sink),
            move |late: Result<Arc<dyn Browser>>| {
                if let Ok(browser) = late {
                    tracing::warn!(client_id, "closing browser built after its creator timed out");
                    browser.close(true);
                }
            },
        ) {
            Ok(created) => created?,
            Err(e) => {
                tracing::warn!(connection = session.id(), client_id, error = %e, "browser creation abandoned");
                return Err(e);
            }
        };

        let handle = bridge.objects().register(TrackedObject::Browser(browser));
        channel.bind(handle);
        tracing::debug!(connection = session.id(), %handle, client_id = self.client_id, "browser registered");
        Ok(handle)
    }
}

engine_action!(
    /// Load the first URL; `onAfterCreated` follows on the backward channel
    StartBrowserCreation, "startBrowserCreation", browser,
    |browser, url: String| browser.start(&url)
);

engine_action!(
    /// Close the browser; its handle is released once `onBeforeClose` is sent
    CloseBrowser, "closeBrowser", browser,
    |browser| browser.close(false)
);

engine_action!(Reload, "Browser_Reload", browser, |browser| browser.reload());
engine_action!(
    ReloadIgnoreCache, "Browser_ReloadIgnoreCache", browser,
    |browser| browser.reload_ignore_cache()
);
engine_action!(LoadUrl, "Browser_LoadURL", browser, |browser, url: String| browser.load_url(&url));
engine_getter!(GetUrl, "Browser_GetURL", browser -> String = String::new(), |browser| browser.url());
engine_action!(
    ExecuteJavaScript, "Browser_ExecuteJavaScript", browser,
    |browser, code: String, script_url: String, start_line: i32|
        browser.execute_javascript(&code, &script_url, start_line)
);
engine_action!(WasResized, "Browser_WasResized", browser, |browser| browser.was_resized());
engine_action!(
    NotifyScreenInfoChanged, "Browser_NotifyScreenInfoChanged", browser,
    |browser| browser.notify_screen_info_changed()
);

engine_getter!(CanGoBack, "Browser_CanGoBack", browser -> bool = false, |browser| browser.can_go_back());
engine_getter!(
    CanGoForward, "Browser_CanGoForward", browser -> bool = false,
    |browser| browser.can_go_forward()
);
engine_action!(GoBack, "Browser_GoBack", browser, |browser| browser.go_back());
engine_action!(GoForward, "Browser_GoForward", browser, |browser| browser.go_forward());
engine_getter!(IsLoading, "Browser_IsLoading", browser -> bool = false, |browser| browser.is_loading());
engine_action!(StopLoad, "Browser_StopLoad", browser, |browser| browser.stop_load());
engine_getter!(GetFrameCount, "Browser_GetFrameCount", browser -> i32 = 0, |browser| browser.frame_count());
engine_getter!(IsPopup, "Browser_IsPopup", browser -> bool = false, |browser| browser.is_popup());
engine_getter!(HasDocument, "Browser_HasDocument", browser -> bool = false, |browser| browser.has_document());
engine_action!(ViewSource, "Browser_ViewSource", browser, |browser| browser.view_source());
engine_action!(
    /// Page source arrives as `StringVisitor_visit(visitor, text)`
    GetSource, "Browser_GetSource", browser,
    |browser, visitor: ClientObjectId| browser.get_source(visitor)
);
engine_action!(
    GetText, "Browser_GetText", browser,
    |browser, visitor: ClientObjectId| browser.get_text(visitor)
);
engine_action!(SetFocus, "Browser_SetFocus", browser, |browser, focus: bool| browser.set_focus(focus));
engine_getter!(GetZoomLevel, "Browser_GetZoomLevel", browser -> f64 = 0.0, |browser| browser.zoom_level());
engine_action!(
    SetZoomLevel, "Browser_SetZoomLevel", browser,
    |browser, level: f64| browser.set_zoom_level(level)
);
engine_action!(SetFrameRate, "Browser_SetFrameRate", browser, |browser, fps: i32| browser.set_frame_rate(fps));
engine_action!(
    StartDownload, "Browser_StartDownload", browser,
    |browser, url: String| browser.start_download(&url)
);
engine_action!(
    Find, "Browser_Find", browser,
    |browser, text: String, forward: bool, match_case: bool, find_next: bool|
        browser.find(&text, forward, match_case, find_next)
);
engine_action!(
    StopFinding, "Browser_StopFinding", browser,
    |browser, clear_selection: bool| browser.stop_finding(clear_selection)
);
engine_action!(
    ReplaceMisspelling, "Browser_ReplaceMisspelling", browser,
    |browser, word: String| browser.replace_misspelling(&word)
);

engine_action!(
    ImeSetComposition, "Browser_ImeSetComposition", browser,
    |browser, text: String, selection_start: i32, selection_end: i32| browser.ime_set_composition(
        &text,
        Range {
            from: selection_start,
            to: selection_end,
        },
    )
);
engine_action!(ImeCommitText, "Browser_ImeCommitText", browser, |browser, text: String| browser.ime_commit_text(&text));
engine_action!(
    ImeFinishComposingText, "Browser_ImeFinishComposingText", browser,
    |browser, keep_selection: bool| browser.ime_finish_composing_text(keep_selection)
);
engine_action!(
    ImeCancelComposing, "Browser_ImeCancelComposing", browser,
    |browser| browser.ime_cancel_composition()
);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendKeyEvent {
    pub browser: Handle,
    pub event_type: i32,
    pub modifiers: i32,
    pub key_char: u16,
    pub scan_code: i64,
    pub key_code: i32,
}

impl Command for SendKeyEvent {
    const METHOD: &'static str = "Browser_SendKeyEvent";
    type Reply = ();

    fn handle(self, session: &mut Session) -> Result<()> {
        let bridge = session.bridge();
        let browser = bridge.objects().browser(self.browser)?;
        let raw = RawKeyEvent {
            event_type: self.event_type,
            modifiers: self.modifiers,
            key_char: self.key_char,
            scan_code: self.scan_code,
            key_code: self.key_code,
        };
        let Some(event) = bridge.translator().key_event(&raw) else {
            tracing::debug!(?raw, "key event has no engine equivalent");
            return Ok(());
        };
        bridge.dispatcher().post_async(move || browser.send_key_event(event))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMouseEvent {
    pub browser: Handle,
    pub event_type: i32,
    pub x: i32,
    pub y: i32,
    pub modifiers: i32,
    pub click_count: i32,
    pub button: i32,
}

impl Command for SendMouseEvent {
    const METHOD: &'static str = "Browser_SendMouseEvent";
    type Reply = ();

    fn handle(self, session: &mut Session) -> Result<()> {
        let bridge = session.bridge();
        let browser = bridge.objects().browser(self.browser)?;
        let raw = RawMouseEvent {
            event_type: self.event_type,
            x: self.x,
            y: self.y,
            modifiers: self.modifiers,
            click_count: self.click_count,
            button: self.button,
        };
        let Some(event) = bridge.translator().mouse_event(&raw) else {
            tracing::debug!(?raw, "mouse event has no engine equivalent");
            return Ok(());
        };
        bridge.dispatcher().post_async(move || browser.send_mouse_event(event))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMouseWheelEvent {
    pub browser: Handle,
    pub scroll_type: i32,
    pub x: i32,
    pub y: i32,
    pub modifiers: i32,
    pub delta: i32,
    pub units_to_scroll: i32,
}

impl Command for SendMouseWheelEvent {
    const METHOD: &'static str = "Browser_SendMouseWheelEvent";
    type Reply = ();

    fn handle(self, session: &mut Session) -> Result<()> {
        let bridge = session.bridge();
        let browser = bridge.objects().browser(self.browser)?;
        let event = bridge.translator().wheel_event(&RawWheelEvent {
            scroll_type: self.scroll_type,
            x: self.x,
            y: self.y,
            modifiers: self.modifiers,
            delta: self.delta,
            units_to_scroll: self.units_to_scroll,
        });
        bridge.dispatcher().post_async(move || browser.send_mouse_wheel_event(event))
    }
}

/// Register the browser's main frame; `0` when there is none yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMainFrame {
    pub browser: Handle,
}

impl Command for GetMainFrame {
    const METHOD: &'static str = "Browser_GetMainFrame";
    type Reply = u64;

    fn handle(self, session: &mut Session) -> Result<u64> {
        let bridge = session.bridge();
        let browser = bridge.objects().browser(self.browser)?;
        let frame = bridge.dispatcher().post_sync_or(None, move || browser.main_frame())?;
        match frame {
            // one handle per browser, released with it
            Some(frame) => Ok(bridge
                .objects()
                .register_unique(TrackedObject::Frame(frame), self.browser)?
                .raw()),
            None => Ok(0),
        }
    }
}

engine_getter!(FrameGetUrl, "Frame_GetURL", frame -> String = String::new(), |frame| frame.url());
engine_getter!(FrameGetName, "Frame_GetName", frame -> String = String::new(), |frame| frame.name());
super::dispose!(FrameDispose, "Frame_Dispose", frame);

pub(super) fn register(router: Router) -> Router {
    router
        .register::<CreateBrowser>()
        .register::<StartBrowserCreation>()
        .register::<CloseBrowser>()
        .register::<Reload>()
        .register::<ReloadIgnoreCache>()
        .register::<LoadUrl>()
        .register::<GetUrl>()
        .register::<ExecuteJavaScript>()
        .register::<WasResized>()
        .register::<NotifyScreenInfoChanged>()
        .register::<SendKeyEvent>()
        .register::<SendMouseEvent>()
        .register::<SendMouseWheelEvent>()
        .register::<CanGoBack>()
        .register::<CanGoForward>()
        .register::<GoBack>()
        .register::<GoForward>()
        .register::<IsLoading>()
        .register::<StopLoad>()
        .register::<GetFrameCount>()
        .register::<IsPopup>()
        .register::<HasDocument>()
        .register::<ViewSource>()
        .register::<GetSource>()
        .register::<GetText>()
        .register::<SetFocus>()
        .register::<GetZoomLevel>()
        .register::<SetZoomLevel>()
        .register::<SetFrameRate>()
        .register::<StartDownload>()
        .register::<Find>()
        .register::<StopFinding>()
        .register::<ReplaceMisspelling>()
        .register::<ImeSetComposition>()
        .register::<ImeCommitText>()
        .register::<ImeFinishComposingText>()
        .register::<ImeCancelComposing>()
        .register::<GetMainFrame>()
        .register::<FrameGetUrl>()
        .register::<FrameGetName>()
        .register::<FrameDispose>()
}
