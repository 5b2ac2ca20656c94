//! Process-wide bridge context
//!
//! One [`Bridge`] owns everything sessions share: the object table, the
//! dispatcher in front of the engine thread, the callback bridge and the input
//! translator. It is created once with [`Bridge::init`] and torn down with
//! [`Bridge::shutdown`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::callback::CallbackBridge;
use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::{Engine, TaskRunner};
use crate::handle::{ObjectKind, ObjectTable};
use crate::input::InputTranslator;

/// Shared state of all sessions
pub struct Bridge {
    config: BridgeConfig,
    objects: Arc<ObjectTable>,
    dispatcher: Dispatcher,
    runner: Arc<dyn TaskRunner>,
    engine: Arc<dyn Engine>,
    engine_version: String,
    callbacks: Arc<CallbackBridge>,
    translator: Arc<dyn InputTranslator>,
    connections: AtomicUsize,
    stopping: AtomicBool,
    stop_signal: (Mutex<bool>, Condvar),
}

impl Bridge {
    /// Build the bridge around an initialized engine
    pub fn init(
        config: BridgeConfig,
        engine: Arc<dyn Engine>,
        runner: Arc<dyn TaskRunner>,
        translator: Arc<dyn InputTranslator>,
    ) -> Arc<Self> {
        let objects = Arc::new(ObjectTable::new());
        let dispatcher = Dispatcher::new(Arc::clone(&runner), config.sync_timeout());
        let callbacks = Arc::new(CallbackBridge::new(
            Arc::clone(&objects),
            config.backward_connect_timeout(),
            config.outbox_capacity(),
        ));
        let engine_version = engine.version();

        tracing::info!(engine = %engine_version, timeout = ?config.sync_timeout(), "bridge initialized");

        Arc::new(Self {
            config,
            objects,
            dispatcher,
            runner,
            engine,
            engine_version,
            callbacks,
            translator,
            connections: AtomicUsize::new(0),
            stopping: AtomicBool::new(false),
            stop_signal: (Mutex::new(false), Condvar::new()),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn callbacks(&self) -> &Arc<CallbackBridge> {
        &self.callbacks
    }

    pub fn translator(&self) -> &dyn InputTranslator {
        self.translator.as_ref()
    }

    /// `"<bridge version> (<engine version>)"`
    pub fn version(&self) -> String {
        format!("{} ({})", env!("CARGO_PKG_VERSION"), self.engine_version)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }

    /// Snapshot of the bridge as JSON, for diagnostics
    pub fn state_json(&self) -> serde_json::Value {
        let counts = self.objects.counts();
        let handles: serde_json::Map<String, serde_json::Value> = ObjectKind::ALL
            .iter()
            .map(|kind| {
                let count = counts
                    .iter()
                    .find(|(k, _)| k == kind)
                    .map_or(0, |(_, count)| *count);
                (kind.name().to_string(), serde_json::Value::from(count))
            })
            .collect();

        let engine = Arc::clone(&self.engine);
        let browsers = self
            .dispatcher
            .post_sync_or(None, move || Some(engine.browser_count()))
            .unwrap_or(None);

        serde_json::json!({
            "connections": self.connection_count(),
            "master": self.callbacks.master(),
            "handles": handles,
            "engine": {
                "version": self.engine_version,
                "browsers": browsers,
                "stopping": self.is_stopping(),
            },
        })
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Ask the engine loop to exit and wake [`wait_for_stop`](Self::wait_for_stop)
    pub fn request_stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("stop requested");
        self.runner.quit();

        let (flag, condvar) = &self.stop_signal;
        *flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
        condvar.notify_all();
    }

    /// Block until a stop was requested or `timeout` elapsed; `true` if stopped
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &self.stop_signal;
        let guard = flag.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard
    }

    /// Notify the master and close every backward channel, then drop all handles
    ///
    /// Called once the engine loop exited, before the RPC server stops, so the
    /// master's backward channel is still registered.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.callbacks.broadcast_shutdown();
        self.callbacks.shutdown();
        let released = self.objects.clear();
        tracing::info!(released = released.len(), "bridge shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::engine::TaskQueue;
    use crate::engine::headless::HeadlessEngine;
    use crate::platform::native_translator;

    #[test]
    fn test_state_reports_counts() {
        let (queue, engine_loop) = TaskQueue::new();
        let runner: Arc<dyn TaskRunner> = Arc::new(queue);
        let engine = HeadlessEngine::init(EngineSettings::default(), Arc::clone(&runner)).unwrap();
        let engine_thread = engine_loop.spawn().unwrap();
        let bridge = Bridge::init(
            BridgeConfig::default(),
            engine,
            runner,
            native_translator(),
        );

        let state = bridge.state_json();
        assert_eq!(state["connections"], 0);
        assert_eq!(state["handles"]["browser"], 0);
        assert_eq!(state["engine"]["browsers"], 0);
        assert!(bridge.version().starts_with(env!("CARGO_PKG_VERSION")));

        bridge.request_stop();
        assert!(bridge.wait_for_stop(Duration::from_millis(10)));
        engine_thread.join().unwrap();
        assert!(bridge.is_stopping());
    }
}
