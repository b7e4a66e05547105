//! # Per-Process Task Scheduler
//!
//! Serializes the asynchronous handler invocations of one actor into a
//! single logical thread of execution: strict FIFO, at most one task in
//! flight, and a one-way terminal transition that discards everything still
//! pending.
//!
//! The scheduler's run loop is the only suspension point an actor has. A
//! task may suspend for as long as it likes without affecting any other
//! actor; tasks queued behind it simply wait their turn. Termination races
//! against the currently suspended task, so a long-suspended task is
//! abandoned promptly once the scheduler dies for another reason.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::error::ActorFailure;

/// A unit of work: consumes the current state, produces the next one.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<Value, ActorFailure>> + Send>>;
pub type Task = Box<dyn FnOnce(Value) -> TaskFuture + Send>;

/// Handle to one actor's serial executor.
///
/// Cheap to clone; all clones share the same task stream, committed state
/// and terminal flag.
#[derive(Clone)]
pub struct TaskScheduler {
    tasks: mpsc::UnboundedSender<Task>,
    state: watch::Receiver<Value>,
    cancel: watch::Sender<bool>,
    terminal: Arc<AtomicBool>,
}

impl TaskScheduler {
    /// Spawns the run loop with the given committed state.
    ///
    /// The returned receiver fires exactly once, with the failure of the
    /// first task that errors. It never fires for an external
    /// [`terminate`](Self::terminate).
    pub fn new(initial: Value) -> (Self, oneshot::Receiver<ActorFailure>) {
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<Task>();
        let (state_tx, state_rx) = watch::channel(initial.clone());
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (failure_tx, failure_rx) = oneshot::channel();
        let terminal = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&terminal);
        tokio::spawn(async move {
            let mut state = initial;
            let mut failure_tx = Some(failure_tx);
            loop {
                let task = tokio::select! {
                    // Termination wins over pending work: a task enqueued
                    // before terminate() fired must never start.
                    biased;
                    _ = cancel_rx.changed() => break,
                    next = task_rx.recv() => match next {
                        Some(task) => task,
                        None => break,
                    },
                };
                let running = task(state.clone());
                tokio::select! {
                    // Abandon the suspended task the moment termination is
                    // triggered elsewhere; its partial effects are lost.
                    _ = cancel_rx.changed() => break,
                    result = running => match result {
                        Ok(next) => {
                            state = next;
                            let _ = state_tx.send(state.clone());
                        }
                        Err(err) => {
                            flag.store(true, Ordering::SeqCst);
                            debug!(error = %err, "task failed, scheduler terminal");
                            if let Some(tx) = failure_tx.take() {
                                let _ = tx.send(err);
                            }
                            break;
                        }
                    },
                }
            }
            flag.store(true, Ordering::SeqCst);
        });

        (
            Self {
                tasks: task_tx,
                state: state_rx,
                cancel: cancel_tx,
                terminal,
            },
            failure_rx,
        )
    }

    /// Appends a task to the pending queue. Runs immediately if nothing is
    /// running, otherwise waits its turn. No-op once terminal.
    pub fn enqueue(&self, task: Task) {
        if self.terminal.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.tasks.send(task);
    }

    /// The most recently committed state, or the initial state if no task
    /// has completed yet.
    pub fn state(&self) -> Value {
        self.state.borrow().clone()
    }

    /// One-way external termination: discards pending tasks and abandons the
    /// currently suspended one. Does not fire the failure receiver.
    pub fn terminate(&self) {
        self.terminal.store(true, Ordering::SeqCst);
        let _ = self.cancel.send(true);
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::SeqCst)
    }
}

/// Wraps an async closure into a [`Task`].
///
/// Keeps call sites free of the boxing ceremony:
/// `scheduler.enqueue(task(|state| async move { Ok(state) }))`.
pub fn task<F, Fut>(f: F) -> Task
where
    F: FnOnce(Value) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, ActorFailure>> + Send + 'static,
{
    Box::new(move |state| Box::pin(f(state)))
}
