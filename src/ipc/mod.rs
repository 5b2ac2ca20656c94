//! Length-prefixed MessagePack RPC
//!
//! The same framing carries both directions of a session: the client's
//! forward calls into the engine and the engine's backward calls into the
//! client's callback server.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde::{Serialize, Deserialize};
//! use browser_bridge::ipc::{Command, Router};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Echo { msg: String }
//!
//! impl Command for Echo {
//!     const METHOD: &'static str = "echo";
//!     const NEEDS_SESSION: bool = false;
//!     type Reply = String;
//!
//!     fn handle(self, _session: &mut Session) -> Result<String> {
//!         Ok(self.msg)
//!     }
//! }
//!
//! let router = Router::new().register::<Echo>();
//! ```

mod client;
mod command;
mod protocol;
mod router;
mod server;
mod transport;

pub use client::Client;
pub use command::Command;
pub use protocol::{DEFAULT_MAX_FRAME_LEN, ReplyFrame, RequestFrame, read_frame, write_frame};
pub use router::Router;
pub use server::{ConnectionHandler, ConnectionId, ConnectionInfo, HandlerFactory, Server};
pub use transport::{DEFAULT_PIPE_NAME, Endpoint, Listener, Stream};
