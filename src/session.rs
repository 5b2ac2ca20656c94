//! Per-connection session
//!
//! A [`SessionFactory`] hands every accepted connection its own [`Session`]:
//! private negotiation state on top of the shared [`Bridge`].

use std::sync::Arc;

use serde::Serialize;

use crate::bridge::Bridge;
use crate::callback::Role;
use crate::ipc::{
    ConnectionHandler, ConnectionId, ConnectionInfo, Endpoint, HandlerFactory, ReplyFrame,
    RequestFrame, Router,
};

/// Lifecycle of a connection
///
/// `Accepted → Negotiating → Active → Closing → Closed`; a session never
/// returns to `Active` once it started closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Accepted,
    Negotiating,
    Active,
    Closing,
    Closed,
}

/// One client connection
pub struct Session {
    id: ConnectionId,
    peer: String,
    state: ConnectionState,
    role: Option<Role>,
    stop_requested: bool,
    bridge: Arc<Bridge>,
    router: Arc<Router>,
}

impl Session {
    pub fn new(info: &ConnectionInfo, bridge: Arc<Bridge>, router: Arc<Router>) -> Self {
        bridge.connection_opened();
        Self {
            id: info.id,
            peer: info.peer.clone(),
            state: ConnectionState::Accepted,
            role: None,
            stop_requested: false,
            bridge,
            router,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    /// Negotiate the session and open its backward channel
    ///
    /// Returns the connection id, or `-1` when the backward channel could not
    /// be opened. The session is `Active` either way. Calling it again on an
    /// active session replaces the backward channel.
    pub fn negotiate(&mut self, backward: &Endpoint, wants_master: bool) -> i32 {
        if self.state == ConnectionState::Accepted {
            self.state = ConnectionState::Negotiating;
        }

        let role = self.bridge.callbacks().claim_role(self.id, wants_master);
        if wants_master && role == Role::Slave {
            tracing::info!(connection = self.id, "master already taken, session downgraded to slave");
        }
        self.role = Some(role);

        let attached = self.bridge.callbacks().attach(self.id, backward);
        self.state = ConnectionState::Active;
        tracing::info!(connection = self.id, peer = %self.peer, ?role, %backward, "session negotiated");

        match attached {
            Ok(()) => i32::try_from(self.id).unwrap_or(i32::MAX),
            Err(_) => -1,
        }
    }

    /// Close this connection after the current reply and stop the server
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }
}

impl ConnectionHandler for Session {
    fn handle(&mut self, request: &RequestFrame) -> ReplyFrame {
        let router = Arc::clone(&self.router);
        match router.dispatch(self, request) {
            Ok(payload) => ReplyFrame::ok(payload),
            Err(e) => {
                tracing::warn!(connection = self.id, method = %request.method, error = %e, "request failed");
                ReplyFrame::error(&e.to_remote())
            }
        }
    }

    fn wants_close(&self) -> bool {
        self.stop_requested
    }

    fn closed(&mut self) {
        self.state = ConnectionState::Closing;
        self.bridge.callbacks().detach(self.id);
        self.bridge.connection_closed();
        self.state = ConnectionState::Closed;
        tracing::debug!(connection = self.id, "session closed");

        if self.stop_requested {
            self.bridge.request_stop();
        }
    }
}

/// Builds one [`Session`] per accepted connection
pub struct SessionFactory {
    bridge: Arc<Bridge>,
    router: Arc<Router>,
}

impl SessionFactory {
    pub fn new(bridge: Arc<Bridge>, router: Router) -> Self {
        Self {
            bridge,
            router: Arc::new(router),
        }
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }
}

impl HandlerFactory for SessionFactory {
    type Handler = Session;

    fn open(&self, info: &ConnectionInfo) -> Session {
        Session::new(info, Arc::clone(&self.bridge), Arc::clone(&self.router))
    }
}
