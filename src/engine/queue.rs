//! Engine thread task queue

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use crate::engine::{Task, TaskRunner};

enum Message {
    Run(Task),
    Quit,
}

/// Producer side of the engine queue
///
/// Cheap to clone; every clone feeds the same [`EngineLoop`].
#[derive(Clone)]
pub struct TaskQueue {
    sender: Sender<Message>,
    engine_thread: Arc<OnceLock<ThreadId>>,
}

/// Consumer side of the engine queue, run on the engine thread
pub struct EngineLoop {
    receiver: Receiver<Message>,
    engine_thread: Arc<OnceLock<ThreadId>>,
}

impl TaskQueue {
    pub fn new() -> (TaskQueue, EngineLoop) {
        let (sender, receiver) = mpsc::channel();
        let engine_thread = Arc::new(OnceLock::new());
        (
            TaskQueue {
                sender,
                engine_thread: Arc::clone(&engine_thread),
            },
            EngineLoop {
                receiver,
                engine_thread,
            },
        )
    }
}

impl TaskRunner for TaskQueue {
    fn post(&self, task: Task) -> bool {
        self.sender.send(Message::Run(task)).is_ok()
    }

    fn is_engine_thread(&self) -> bool {
        self.engine_thread.get() == Some(&thread::current().id())
    }

    fn quit(&self) {
        let _ = self.sender.send(Message::Quit);
    }
}

impl EngineLoop {
    /// Run queued tasks on the calling thread until [`TaskRunner::quit`]
    ///
    /// The calling thread becomes the engine thread for the lifetime of the
    /// process. Tasks still queued behind the quit message are dropped unrun.
    pub fn run(self) {
        let current = thread::current().id();
        let owner = *self.engine_thread.get_or_init(|| current);
        debug_assert_eq!(owner, current, "engine loop moved between threads");

        tracing::debug!("engine loop started");
        for message in self.receiver.iter() {
            match message {
                Message::Run(task) => {
                    if catch_unwind(AssertUnwindSafe(task)).is_err() {
                        tracing::error!("engine task panicked");
                    }
                }
                Message::Quit => break,
            }
        }
        tracing::debug!("engine loop finished");
    }

    /// Spawn a dedicated thread running this loop
    pub fn spawn(self) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("engine".to_string())
            .spawn(move || self.run())
    }
}
