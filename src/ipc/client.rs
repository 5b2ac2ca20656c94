//! Blocking RPC client
//!
//! Used by the engine for the backward connection and by tools talking to the
//! server. One request is in flight at a time.

use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{BridgeError, Result};
use crate::ipc::protocol::{
    DEFAULT_MAX_FRAME_LEN, ReplyFrame, RequestFrame, read_frame, write_frame,
};
use crate::ipc::transport::{Endpoint, Stream};

/// Connection to an RPC server
pub struct Client {
    stream: Stream,
    endpoint: Endpoint,
    max_frame_len: usize,
}

impl Client {
    /// Connect to `endpoint`
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<Self> {
        let stream = Stream::connect(endpoint, timeout)?;
        Ok(Self {
            stream,
            endpoint: endpoint.clone(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bound the wait for each reply
    pub fn set_reply_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    /// Send a request and wait for the raw reply
    pub fn call_raw(&mut self, request: &RequestFrame) -> Result<ReplyFrame> {
        write_frame(&mut self.stream, &request.to_bytes())?;
        let body = read_frame(&mut self.stream, self.max_frame_len)?.ok_or_else(|| {
            BridgeError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before reply",
            ))
        })?;
        ReplyFrame::from_bytes(&body)
    }

    /// Call `method` with positional `params` and decode the result
    pub fn call<P, R>(&mut self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = RequestFrame::new(method, params)?;
        self.call_raw(&request)?.into_result()
    }

    /// Shut the connection down
    pub fn close(&self) {
        let _ = self.stream.shutdown();
    }
}
