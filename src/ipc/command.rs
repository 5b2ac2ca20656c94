//! RPC command trait definition

use serde::{Serialize, de::DeserializeOwned};

use crate::error::Result;
use crate::session::Session;

/// A remotely callable method with its handler
///
/// The implementing struct is the method's argument list. It is decoded from the
/// request's MessagePack array, so field order is the positional argument order
/// on the wire.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Echo {
///     msg: String,
/// }
///
/// impl Command for Echo {
///     const METHOD: &'static str = "echo";
///     const NEEDS_SESSION: bool = false;
///     type Reply = String;
///
///     fn handle(self, _session: &mut Session) -> Result<String> {
///         Ok(self.msg)
///     }
/// }
/// ```
pub trait Command: Serialize + DeserializeOwned + Send + 'static {
    /// Method name used for dispatch
    const METHOD: &'static str;

    /// Whether the connection must have completed `connect` first
    const NEEDS_SESSION: bool = true;

    /// Result returned to the caller
    type Reply: Serialize;

    /// Run the command on behalf of the connection
    fn handle(self, session: &mut Session) -> Result<Self::Reply>;
}
