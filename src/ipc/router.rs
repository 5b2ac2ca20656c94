//! Router dispatching requests to registered commands

use std::collections::HashMap;

use crate::error::{BridgeError, Result};
use crate::ipc::command::Command;
use crate::ipc::protocol::RequestFrame;
use crate::session::Session;

/// Type-erased handler function
type ErasedHandler = Box<dyn Fn(&mut Session, &RequestFrame) -> Result<Vec<u8>> + Send + Sync>;

/// Router that dispatches requests to registered command handlers
///
/// The router stores type-erased handlers internally, but registration is type-safe
/// via the [`Command`] trait. It is built once and shared by all connections.
pub struct Router {
    handlers: HashMap<&'static str, ErasedHandler>,
}

impl Router {
    /// Create a new empty router
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a command type
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let router = Router::new()
    ///     .register::<Echo>()
    ///     .register::<Version>();
    /// ```
    pub fn register<C: Command>(mut self) -> Self {
        let handler: ErasedHandler = Box::new(|session: &mut Session, request: &RequestFrame| {
            if C::NEEDS_SESSION && !session.is_active() {
                return Err(BridgeError::NotConnected);
            }
            let command: C = request.decode_params()?;
            let reply = command.handle(session)?;
            Ok(rmp_serde::to_vec(&reply)?)
        });

        if self.handlers.insert(C::METHOD, handler).is_some() {
            tracing::warn!(method = C::METHOD, "command registered twice, keeping the last one");
        }
        self
    }

    /// Handle an incoming request, returning the encoded reply payload
    pub fn dispatch(&self, session: &mut Session, request: &RequestFrame) -> Result<Vec<u8>> {
        let handler = self
            .handlers
            .get(request.method.as_str())
            .ok_or_else(|| BridgeError::UnknownMethod(request.method.clone()))?;

        handler(session, request)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.handlers.keys().copied().collect();
        methods.sort_unstable();
        methods
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
