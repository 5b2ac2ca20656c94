//! Session methods: negotiation, diagnostics and shutdown
//!
//! These are the only methods accepted before `connect`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::ipc::{Command, Endpoint, Router};
use crate::session::Session;

/// Negotiate over a local socket: the client's callback server listens on `pipe`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connect {
    pub pipe: String,
    pub is_master: bool,
}

impl Command for Connect {
    const METHOD: &'static str = "connect";
    const NEEDS_SESSION: bool = false;
    type Reply = i32;

    fn handle(self, session: &mut Session) -> Result<i32> {
        if self.pipe.is_empty() {
            return Err(BridgeError::BadParams {
                method: Self::METHOD.to_string(),
                message: "pipe path is empty".to_string(),
            });
        }
        Ok(session.negotiate(&Endpoint::Pipe(PathBuf::from(self.pipe)), self.is_master))
    }
}

/// Negotiate over TCP: the client's callback server listens on `127.0.0.1:port`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectTcp {
    pub port: i32,
    pub is_master: bool,
}

impl Command for ConnectTcp {
    const METHOD: &'static str = "connectTcp";
    const NEEDS_SESSION: bool = false;
    type Reply = i32;

    fn handle(self, session: &mut Session) -> Result<i32> {
        let port = u16::try_from(self.port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| BridgeError::BadParams {
                method: Self::METHOD.to_string(),
                message: format!("invalid port {}", self.port),
            })?;
        Ok(session.negotiate(&Endpoint::Tcp(port), self.is_master))
    }
}

/// Write a client message to the server log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    pub msg: String,
}

impl Command for Log {
    const METHOD: &'static str = "log";
    const NEEDS_SESSION: bool = false;
    type Reply = ();

    fn handle(self, session: &mut Session) -> Result<()> {
        tracing::info!(target: "client", connection = session.id(), "{}", self.msg);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Echo {
    pub msg: String,
}

impl Command for Echo {
    const METHOD: &'static str = "echo";
    const NEEDS_SESSION: bool = false;
    type Reply = String;

    fn handle(self, _session: &mut Session) -> Result<String> {
        Ok(self.msg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {}

impl Command for Version {
    const METHOD: &'static str = "version";
    const NEEDS_SESSION: bool = false;
    type Reply = String;

    fn handle(self, session: &mut Session) -> Result<String> {
        Ok(session.bridge().version())
    }
}

/// Bridge state as a JSON document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {}

impl Command for State {
    const METHOD: &'static str = "state";
    const NEEDS_SESSION: bool = false;
    type Reply = String;

    fn handle(self, session: &mut Session) -> Result<String> {
        let mut state = session.bridge().state_json();
        state["session"] = serde_json::json!({
            "id": session.id(),
            "state": session.state(),
            "role": session.role(),
        });
        serde_json::to_string(&state).map_err(|e| BridgeError::Protocol(e.to_string()))
    }
}

/// Shut the server down once the reply is sent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {}

impl Command for Stop {
    const METHOD: &'static str = "stop";
    const NEEDS_SESSION: bool = false;
    type Reply = ();

    fn handle(self, session: &mut Session) -> Result<()> {
        tracing::info!(connection = session.id(), "stop requested by client");
        session.request_stop();
        Ok(())
    }
}

pub(super) fn register(router: Router) -> Router {
    router
        .register::<Connect>()
        .register::<ConnectTcp>()
        .register::<Log>()
        .register::<Echo>()
        .register::<Version>()
        .register::<State>()
        .register::<Stop>()
}
