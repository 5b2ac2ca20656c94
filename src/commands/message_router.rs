//! `MessageRouter_*` methods
//!
//! A router owns the page functions `query`/`cancel` installed into every
//! browser it is added to. Page queries are forwarded to the client handlers
//! registered on the router, first handler first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::engine_getter;
use crate::engine::{ClientObjectId, RouterConfig};
use crate::error::{BridgeError, Result};
use crate::handle::{Handle, TrackedObject};
use crate::ipc::{Command, Router};
use crate::session::Session;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRouterCreate {
    pub query: String,
    pub cancel: String,
}

impl Command for MessageRouterCreate {
    const METHOD: &'static str = "MessageRouter_Create";
    type Reply = Handle;

    fn handle(self, session: &mut Session) -> Result<Handle> {
        let bridge = session.bridge();
        let engine = Arc::clone(bridge.engine());
        let config = RouterConfig {
            query_function: self.query,
            cancel_function: self.cancel,
        };

        let router = bridge
            .dispatcher()
            .post_sync(move || engine.create_message_router(config))??;
        let handle = bridge.objects().register(TrackedObject::MessageRouter(router));
        tracing::debug!(connection = session.id(), %handle, "message router created");
        Ok(handle)
    }
}

/// Release the router and detach it from every browser
///
/// Disposing an already disposed router succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRouterDispose {
    pub router: Handle,
}

impl Command for MessageRouterDispose {
    const METHOD: &'static str = "MessageRouter_Dispose";
    type Reply = ();

    fn handle(self, session: &mut Session) -> Result<()> {
        let bridge = session.bridge();
        let router = match bridge.objects().message_router(self.router) {
            Ok(router) => router,
            Err(BridgeError::InvalidHandle(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        // a concurrent dispose may have won the release
        if bridge.objects().release(self.router).is_none() {
            return Ok(());
        }
        bridge.dispatcher().post_async(move || router.dispose())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMessageRouterToBrowser {
    pub router: Handle,
    pub browser: Handle,
}

impl Command for AddMessageRouterToBrowser {
    const METHOD: &'static str = "MessageRouter_AddMessageRouterToBrowser";
    type Reply = ();

    fn handle(self, session: &mut Session) -> Result<()> {
        let bridge = session.bridge();
        let router = bridge.objects().message_router(self.router)?;
        let browser = bridge.objects().browser(self.browser)?;
        bridge.dispatcher().post_async(move || browser.add_message_router(router))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveMessageRouterFromBrowser {
    pub router: Handle,
    pub browser: Handle,
}

impl Command for RemoveMessageRouterFromBrowser {
    const METHOD: &'static str = "MessageRouter_RemoveMessageRouterFromBrowser";
    type Reply = ();

    fn handle(self, session: &mut Session) -> Result<()> {
        let bridge = session.bridge();
        let router = bridge.objects().message_router(self.router)?;
        let browser = bridge.objects().browser(self.browser)?;
        bridge.dispatcher().post_async(move || browser.remove_message_router(&router))
    }
}

engine_getter!(
    /// `false` when the handler was already registered
    AddHandler, "MessageRouter_AddHandler", message_router -> bool = false,
    |message_router, handler: ClientObjectId, first: bool| message_router.add_handler(handler, first)
);
engine_getter!(
    RemoveHandler, "MessageRouter_RemoveHandler", message_router -> bool = false,
    |message_router, handler: ClientObjectId| message_router.remove_handler(handler)
);

/// Cancel pending queries
///
/// A nil or zero `browser` and a nil `handler` match everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelPending {
    pub router: Handle,
    pub browser: Option<Handle>,
    pub handler: Option<ClientObjectId>,
}

impl Command for CancelPending {
    const METHOD: &'static str = "MessageRouter_CancelPending";
    type Reply = ();

    fn handle(self, session: &mut Session) -> Result<()> {
        let bridge = session.bridge();
        let router = bridge.objects().message_router(self.router)?;
        let browser = match self.browser.filter(|handle| handle.raw() != 0) {
            Some(handle) => Some(bridge.objects().browser(handle)?),
            None => None,
        };
        let handler = self.handler;
        bridge.dispatcher().post_async(move || {
            router.cancel_pending(browser.map(|browser| browser.identifier()), handler)
        })
    }
}

pub(super) fn register(router: Router) -> Router {
    router
        .register::<MessageRouterCreate>()
        .register::<MessageRouterDispose>()
        .register::<AddMessageRouterToBrowser>()
        .register::<RemoveMessageRouterFromBrowser>()
        .register::<AddHandler>()
        .register::<RemoveHandler>()
        .register::<CancelPending>()
}
