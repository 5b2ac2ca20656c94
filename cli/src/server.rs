//! Server lifecycle
//!
//! The engine loop owns the main thread. The RPC server accepts on its own
//! thread and SIGINT/SIGTERM are waited for on a third one; both end up in
//! [`Bridge::request_stop`], which makes the engine loop return.

use std::sync::Arc;

use anyhow::Context;

use browser_bridge::engine::headless::HeadlessEngine;
use browser_bridge::engine::{TaskQueue, TaskRunner};
use browser_bridge::ipc::Server;
use browser_bridge::platform::native_translator;
use browser_bridge::{Bridge, SessionFactory, build_router};

use crate::config::MergedConfig;
use crate::error::CliResult;

pub fn serve(config: MergedConfig) -> CliResult<()> {
    // before any thread exists, so every thread inherits the mask
    #[cfg(unix)]
    let signals = signals::block()?;

    let (queue, engine_loop) = TaskQueue::new();
    let runner: Arc<dyn TaskRunner> = Arc::new(queue);
    let engine = HeadlessEngine::init(config.engine, Arc::clone(&runner))
        .context("failed to initialize the browser engine")?;

    let bridge = Bridge::init(config.bridge, engine, runner, native_translator());
    let endpoint = bridge.config().endpoint().clone();
    let server = Server::start_with_limit(
        &endpoint,
        SessionFactory::new(Arc::clone(&bridge), build_router()),
        bridge.config().max_frame_len(),
    )
    .with_context(|| format!("failed to listen on {endpoint}"))?;

    #[cfg(unix)]
    signals::spawn_waiter(signals, Arc::clone(&bridge))?;

    tracing::info!(endpoint = %server.endpoint(), version = %bridge.version(), "browser bridge ready");
    engine_loop.run();

    tracing::info!("engine loop exited, shutting down");
    // sessions still hold their backward channels here, so the master hears about it
    bridge.shutdown();
    server.stop();
    Ok(())
}

#[cfg(unix)]
mod signals {
    use std::sync::Arc;

    use browser_bridge::Bridge;

    use crate::error::CliResult;

    /// Block SIGINT and SIGTERM on the calling thread
    pub fn block() -> CliResult<libc::sigset_t> {
        // SAFETY: the set is initialized by sigemptyset before use
        let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGINT);
            libc::sigaddset(&mut set, libc::SIGTERM);
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut())
        };
        if rc != 0 {
            anyhow::bail!(
                "failed to block termination signals: {}",
                std::io::Error::from_raw_os_error(rc)
            );
        }
        Ok(set)
    }

    /// Wait for a blocked signal on a dedicated thread, then stop the bridge
    pub fn spawn_waiter(set: libc::sigset_t, bridge: Arc<Bridge>) -> CliResult<()> {
        std::thread::Builder::new()
            .name("signals".to_string())
            .spawn(move || {
                let mut signal: libc::c_int = 0;
                // SAFETY: `set` holds signals blocked in every thread of the process
                let rc = unsafe { libc::sigwait(&set, &mut signal) };
                if rc == 0 {
                    tracing::info!(signal, "termination signal received");
                    bridge.request_stop();
                } else {
                    tracing::warn!(error = %std::io::Error::from_raw_os_error(rc), "sigwait failed");
                }
            })?;
        Ok(())
    }
}
