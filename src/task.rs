//! Cancellable background loops.
//!
//! Both loops of the application run as [`Task`]s: named threads that execute a loop body until
//! their [`CancelToken`] fires. Dropping a [`Task`] cancels it and waits for the thread to exit.
//!
//! Run-to-completion work (like loading the controlled object) uses [`pawawwewism::background`]
//! instead, which cannot be cancelled.

use std::{
    io,
    panic::resume_unwind,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender};

/// Creates a connected pair of [`Canceller`] and [`CancelToken`].
pub fn cancellation() -> (Canceller, CancelToken) {
    // Nothing is ever sent on this channel; disconnection is the signal.
    let (sender, recv) = channel::bounded(0);
    let flag = Arc::new(AtomicBool::new(false));
    (
        Canceller {
            flag: flag.clone(),
            _sender: sender,
        },
        CancelToken { flag, recv },
    )
}

/// Triggers cancellation of all connected [`CancelToken`]s when cancelled or dropped.
pub struct Canceller {
    flag: Arc<AtomicBool>,
    _sender: Sender<()>,
}

impl Canceller {
    /// Cancels all connected [`CancelToken`]s, waking up any thread blocked in a wait.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Canceller {
    fn drop(&mut self) {
        // The flag has to be set before the channel disconnects, so that woken waiters observe it.
        self.flag.store(true, Ordering::Release);
    }
}

/// Observes cancellation requested through the connected [`Canceller`].
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    recv: Receiver<()>,
}

impl CancelToken {
    /// Returns whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// A channel that becomes disconnected on cancellation, for use in [`crossbeam::select!`].
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.recv
    }
}

/// A builder object that can be used to configure and spawn a [`Task`].
#[derive(Clone, Default)]
pub struct TaskBuilder {
    name: Option<String>,
}

impl TaskBuilder {
    /// Sets the name of the [`Task`] thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// Spawns a thread that runs `body` until it returns.
    ///
    /// `body` is expected to check the [`CancelToken`] regularly and return once it fires.
    pub fn spawn<F>(self, body: F) -> io::Result<Task>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let (canceller, token) = cancellation();
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        let name = self.name;
        let handle = builder.spawn(move || {
            if let Some(name) = &name {
                log::trace!("task '{name}' starting");
            }
            body(token);
            if let Some(name) = &name {
                log::trace!("task '{name}' exiting");
            }
        })?;

        Ok(Task {
            canceller: Some(canceller),
            handle: Some(handle),
        })
    }
}

/// A handle to a background thread running a cancellable loop.
///
/// When dropped, the task is cancelled and its thread is joined. If the thread has panicked, the
/// panic will be forwarded to the thread dropping the `Task`.
pub struct Task {
    canceller: Option<Canceller>,
    handle: Option<JoinHandle<()>>,
}

impl Task {
    /// Returns a builder that can be used to configure and spawn a [`Task`].
    #[inline]
    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }

    /// Returns whether the task's thread has finished running.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Cancels the task and waits for it to exit.
    pub fn cancel(self) {
        drop(self);
    }

    fn wait_for_exit(&mut self) {
        // Wait for it to exit and propagate its panic if it panicked.
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => {}
                Err(payload) => {
                    if !thread::panicking() {
                        resume_unwind(payload);
                    }
                }
            }
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        drop(self.canceller.take());

        self.wait_for_exit();
    }
}
