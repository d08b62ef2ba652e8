//! A blocking call run on a helper thread, observed without blocking.

use std::io;
use std::thread::{self, JoinHandle};

/// Observation of a [`StartupTask`].
#[derive(Debug, PartialEq, Eq)]
pub enum TaskPoll<T> {
    /// The call is still running.
    Pending,
    /// The call finished; the thread has been joined.
    Ready(T),
}

/// Handle to a one-shot blocking call running on its own thread.
///
/// The thread's exit is the only completion signal; the control thread
/// checks it with [`StartupTask::poll`] and joins exactly once.
#[derive(Debug)]
pub struct StartupTask<T> {
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> StartupTask<T> {
    /// Run `f` on a new thread named `name`.
    pub fn spawn<F>(name: &str, f: F) -> io::Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_owned()).spawn(f)?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Non-blocking check. Yields `Ready` exactly once; the task is spent
    /// afterwards and keeps answering `Pending`, so owners drop it.
    ///
    /// A panic inside the call surfaces as `Ready(Err(payload))`.
    pub fn poll(&mut self) -> TaskPoll<thread::Result<T>> {
        match &self.handle {
            Some(handle) if handle.is_finished() => match self.handle.take() {
                Some(handle) => TaskPoll::Ready(handle.join()),
                None => TaskPoll::Pending,
            },
            _ => TaskPoll::Pending,
        }
    }

    /// Block until the call returns. No-op once joined.
    pub fn join(&mut self) -> Option<thread::Result<T>> {
        self.handle.take().map(JoinHandle::join)
    }
}
