//! Synchronous dispatcher
//!
//! Bridges RPC threads and the single engine thread. [`Dispatcher::post_async`]
//! fires and forgets; [`Dispatcher::post_sync`] waits for the task's result with a
//! bounded wait.
//!
//! # Timeouts do not cancel
//!
//! When `post_sync` gives up waiting, the task stays queued and runs later. Its
//! side effects happen after the caller has already seen the timeout; its
//! result is discarded, or handed to the cleanup given to
//! [`Dispatcher::post_sync_reclaim`].

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::engine::TaskRunner;
use crate::error::{BridgeError, Result};

/// Default bound on a synchronous engine call
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_millis(1000);

enum Outcome<R> {
    Waiting,
    Done(R),
    // the caller timed out; a late result goes back to the task
    Abandoned,
}

/// One-shot completion signal owned by a single `post_sync` call
struct Pending<R> {
    slot: Mutex<Outcome<R>>,
    ready: Condvar,
}

impl<R> Pending<R> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Outcome::Waiting),
            ready: Condvar::new(),
        }
    }

    /// Hand the result to the caller, or return it if the caller left
    fn complete(&self, value: R) -> Option<R> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*slot, Outcome::Abandoned) {
            return Some(value);
        }
        *slot = Outcome::Done(value);
        self.ready.notify_one();
        None
    }

    fn wait(&self, timeout: Duration) -> Option<R> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Outcome::Done(value) = std::mem::replace(&mut *slot, Outcome::Waiting) {
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                *slot = Outcome::Abandoned;
                return None;
            }
            slot = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }
}

/// Posts work onto the engine thread
#[derive(Clone)]
pub struct Dispatcher {
    runner: Arc<dyn TaskRunner>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn TaskRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Default wait used by [`post_sync`](Self::post_sync) call sites
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_engine_thread(&self) -> bool {
        self.runner.is_engine_thread()
    }

    /// Queue `task` on the engine thread and return immediately
    pub fn post_async<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.runner.post(Box::new(task)) {
            Ok(())
        } else {
            tracing::warn!("engine queue closed, dropping task");
            Err(BridgeError::EngineStopped)
        }
    }

    /// Run `task` on the engine thread and wait for its result
    ///
    /// Called on the engine thread, the task runs inline. Otherwise the caller
    /// blocks until the task finished or `timeout` elapsed. See the module docs
    /// for what happens to a task whose caller timed out.
    pub fn post_sync_with<F, R>(&self, timeout: Duration, task: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.post_sync_reclaim_with(timeout, task, drop)
    }

    /// [`post_sync`](Self::post_sync) passing a result nobody waits for anymore
    /// to `reclaim`, on the engine thread
    ///
    /// Exactly one of the caller and `reclaim` receives the result.
    pub fn post_sync_reclaim<F, R, C>(&self, task: F, reclaim: C) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
        C: FnOnce(R) + Send + 'static,
    {
        self.post_sync_reclaim_with(self.timeout, task, reclaim)
    }

    fn post_sync_reclaim_with<F, R, C>(&self, timeout: Duration, task: F, reclaim: C) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
        C: FnOnce(R) + Send + 'static,
    {
        if self.runner.is_engine_thread() {
            return Ok(task());
        }

        let pending = Arc::new(Pending::new());
        let signal = Arc::clone(&pending);
        let posted = self.runner.post(Box::new(move || {
            if let Some(late) = signal.complete(task()) {
                reclaim(late);
            }
        }));
        if !posted {
            return Err(BridgeError::EngineStopped);
        }

        pending.wait(timeout).ok_or(BridgeError::EngineTimeout(timeout))
    }

    /// [`post_sync_with`](Self::post_sync_with) using the configured timeout
    pub fn post_sync<F, R>(&self, task: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.post_sync_with(self.timeout, task)
    }

    /// Like [`post_sync`](Self::post_sync) but answers `default` on timeout
    ///
    /// Only a timeout maps to the default; a stopped engine is still an error.
    pub fn post_sync_or<F, R>(&self, default: R, task: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        match self.post_sync(task) {
            Err(BridgeError::EngineTimeout(waited)) => {
                tracing::warn!(?waited, "engine call timed out, answering default");
                Ok(default)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TaskQueue;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    fn running() -> (Dispatcher, Arc<crate::engine::TaskQueue>, std::thread::JoinHandle<()>) {
        let (queue, engine_loop) = TaskQueue::new();
        let queue = Arc::new(queue);
        let handle = engine_loop.spawn().unwrap();
        let runner: Arc<dyn TaskRunner> = queue.clone();
        (Dispatcher::new(runner, DEFAULT_SYNC_TIMEOUT), queue, handle)
    }

    #[test]
    fn test_post_sync_returns_result() {
        let (dispatcher, queue, handle) = running();
        let value = dispatcher.post_sync(|| 40 + 2).unwrap();
        assert_eq!(value, 42);
        queue.quit();
        handle.join().unwrap();
    }

    #[test]
    fn test_post_sync_inline_on_engine_thread() {
        let (dispatcher, queue, handle) = running();
        let (tx, rx) = mpsc::channel();

        let inner = dispatcher.clone();
        dispatcher
            .post_async(move || {
                let order = Arc::new(Mutex::new(Vec::new()));
                // queued behind the current task; must not run before the inline call
                let later = Arc::clone(&order);
                inner.post_async(move || later.lock().unwrap().push("queued")).unwrap();

                let nested = Arc::clone(&order);
                let result = inner
                    .post_sync_with(Duration::from_millis(10), move || {
                        nested.lock().unwrap().push("inline");
                        7
                    })
                    .unwrap();
                let snapshot = order.lock().unwrap().clone();
                tx.send((result, snapshot)).unwrap();
            })
            .unwrap();

        let (result, order) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(result, 7);
        assert_eq!(order, vec!["inline"]);
        queue.quit();
        handle.join().unwrap();
    }

    #[test]
    fn test_post_sync_times_out_and_task_still_runs() {
        let (dispatcher, queue, handle) = running();
        let stalled = Arc::new(AtomicBool::new(false));

        dispatcher
            .post_async(|| std::thread::sleep(Duration::from_millis(600)))
            .unwrap();

        let flag = Arc::clone(&stalled);
        let budget = Duration::from_millis(200);
        let started = Instant::now();
        let result = dispatcher.post_sync_with(budget, move || {
            flag.store(true, Ordering::SeqCst);
            1.5_f64
        });
        let waited = started.elapsed();

        assert!(matches!(result, Err(BridgeError::EngineTimeout(d)) if d == budget));
        assert!(waited >= budget);
        assert!(waited <= budget + Duration::from_millis(150), "waited {waited:?}");
        assert!(!stalled.load(Ordering::SeqCst));

        // the task was not cancelled
        dispatcher.post_sync(|| ()).unwrap();
        assert!(stalled.load(Ordering::SeqCst));

        queue.quit();
        handle.join().unwrap();
    }

    #[test]
    fn test_post_sync_or_answers_default() {
        let (queue, engine_loop) = TaskQueue::new();
        let queue = Arc::new(queue);
        let runner: Arc<dyn TaskRunner> = queue.clone();
        let dispatcher = Dispatcher::new(runner, Duration::from_millis(100));
        let handle = engine_loop.spawn().unwrap();

        dispatcher
            .post_async(|| std::thread::sleep(Duration::from_millis(400)))
            .unwrap();
        let zoom = dispatcher.post_sync_or(0.0_f64, || 3.0).unwrap();
        assert_eq!(zoom, 0.0);

        queue.quit();
        handle.join().unwrap();
    }

    #[test]
    fn test_late_result_is_reclaimed() {
        let (queue, engine_loop) = TaskQueue::new();
        let queue = Arc::new(queue);
        let runner: Arc<dyn TaskRunner> = queue.clone();
        let dispatcher = Dispatcher::new(runner, Duration::from_millis(50));
        let handle = engine_loop.spawn().unwrap();
        let (tx, rx) = mpsc::channel();

        dispatcher
            .post_async(|| std::thread::sleep(Duration::from_millis(300)))
            .unwrap();
        let result = dispatcher.post_sync_reclaim(|| 9, move |late| tx.send(late).unwrap());
        assert!(matches!(result, Err(BridgeError::EngineTimeout(_))));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 9);

        // an answered call never reaches the cleanup
        let (tx, rx) = mpsc::channel::<i32>();
        assert_eq!(dispatcher.post_sync_reclaim(|| 4, move |late| tx.send(late).unwrap()).unwrap(), 4);
        dispatcher.post_sync(|| ()).unwrap();
        assert!(rx.try_recv().is_err());

        queue.quit();
        handle.join().unwrap();
    }

    #[test]
    fn test_concurrent_sync_callers_get_their_own_results() {
        let (dispatcher, queue, handle) = running();
        let callers: Vec<_> = (0..8)
            .map(|i| {
                let dispatcher = dispatcher.clone();
                std::thread::spawn(move || dispatcher.post_sync(move || i * 10).unwrap())
            })
            .collect();
        let results: Vec<i32> = callers.into_iter().map(|c| c.join().unwrap()).collect();
        assert_eq!(results, (0..8).map(|i| i * 10).collect::<Vec<_>>());
        queue.quit();
        handle.join().unwrap();
    }

    #[test]
    fn test_stopped_engine_is_reported() {
        let (queue, engine_loop) = TaskQueue::new();
        drop(engine_loop);
        let dispatcher = Dispatcher::new(Arc::new(queue), DEFAULT_SYNC_TIMEOUT);
        assert!(matches!(dispatcher.post_sync(|| 1), Err(BridgeError::EngineStopped)));
        assert!(matches!(dispatcher.post_async(|| {}), Err(BridgeError::EngineStopped)));
    }
}
