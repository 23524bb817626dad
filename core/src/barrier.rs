use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;

/// A unit of asynchronous work. The barrier counts the task as complete when the
/// future resolves, regardless of whether the work inside succeeded; callers that
/// care about per-task outcomes capture them through the closure (see
/// [`crate::retention`]). A task that never resolves stalls the barrier forever —
/// there is no cancellation or deadline mechanism.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Box a future into a [`Task`].
pub fn task(fut: impl Future<Output = ()> + Send + 'static) -> Task {
    Box::pin(fut)
}

/// Maximum number of tasks allowed to run concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// At most this many tasks run at once. Must be at least 1.
    Bounded(usize),
    /// Every submitted task starts immediately; nothing is ever queued.
    Unbounded,
}

impl Capacity {
    fn admits(&self, running: usize) -> bool {
        match *self {
            Capacity::Bounded(cap) => running < cap,
            Capacity::Unbounded => true,
        }
    }
}

/// Misuse of a [`Barrier`] instance.
#[derive(Debug, Error)]
pub enum BarrierError {
    /// `submit` was called after `wait` sealed the barrier.
    #[error("barrier is sealed; no further tasks may be submitted")]
    Sealed,
    /// `wait` was called twice on the same barrier.
    #[error("barrier completion is already being awaited")]
    AlreadyWaiting,
}

struct BarrierState {
    capacity: Capacity,
    running: usize,
    pending: VecDeque<Task>,
    sealed: bool,
    waiting: bool,
    done_tx: Option<oneshot::Sender<()>>,
}

/// Admits tasks under a concurrency cap and signals once when all admitted and
/// queued tasks have completed.
///
/// Tasks at or under capacity are spawned onto the tokio runtime the moment they
/// are submitted; overflow queues FIFO and each queued task starts, in submission
/// order, as a running task finishes. [`Barrier::wait`] seals the barrier against
/// further submissions and resolves exactly once, when the last task is done.
pub struct Barrier {
    state: Arc<Mutex<BarrierState>>,
}

impl Barrier {
    /// Create an empty barrier. Panics if given `Capacity::Bounded(0)`, which
    /// could never run anything.
    pub fn new(capacity: Capacity) -> Self {
        if let Capacity::Bounded(cap) = capacity {
            assert!(cap >= 1, "bounded capacity must be at least 1");
        }
        Self {
            state: Arc::new(Mutex::new(BarrierState {
                capacity,
                running: 0,
                pending: VecDeque::new(),
                sealed: false,
                waiting: false,
                done_tx: None,
            })),
        }
    }

    /// Admit a task: start it now if capacity allows, otherwise queue it.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, task: Task) -> Result<(), BarrierError> {
        let mut s = self.state.lock().expect("barrier lock");
        if s.sealed {
            return Err(BarrierError::Sealed);
        }
        if s.capacity.admits(s.running) {
            s.running += 1;
            drop(s);
            Self::spawn(&self.state, task);
        } else {
            s.pending.push_back(task);
        }
        Ok(())
    }

    /// Seal the barrier and obtain a future that resolves when every submitted
    /// and queued task has completed. If nothing is outstanding the returned
    /// handle is already resolved. Errors on a second call; the completion
    /// signal fires exactly once and silently replacing its consumer would hide
    /// a caller bug.
    pub fn wait(&self) -> Result<WaitHandle, BarrierError> {
        let mut s = self.state.lock().expect("barrier lock");
        if s.waiting {
            return Err(BarrierError::AlreadyWaiting);
        }
        s.waiting = true;
        s.sealed = true;
        let (tx, rx) = oneshot::channel();
        if s.running == 0 && s.pending.is_empty() {
            let _ = tx.send(());
        } else {
            s.done_tx = Some(tx);
        }
        Ok(WaitHandle { rx })
    }

    fn spawn(state: &Arc<Mutex<BarrierState>>, task: Task) {
        let state = Arc::clone(state);
        tokio::spawn(async move {
            task.await;
            Self::task_done(&state);
        });
    }

    fn task_done(state: &Arc<Mutex<BarrierState>>) {
        let next = {
            let mut s = state.lock().expect("barrier lock");
            s.running -= 1;
            if let Some(task) = s.pending.pop_front() {
                s.running += 1;
                Some(task)
            } else {
                if s.running == 0 {
                    if let Some(tx) = s.done_tx.take() {
                        let _ = tx.send(());
                    }
                }
                None
            }
        };
        // Spawn outside the lock.
        if let Some(task) = next {
            Self::spawn(state, task);
        }
    }
}

/// Future returned by [`Barrier::wait`]. Resolves exactly once, when the
/// barrier has drained.
pub struct WaitHandle {
    rx: oneshot::Receiver<()>,
}

impl Future for WaitHandle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The sender is only dropped if the barrier and all its tasks are gone,
        // in which case there is nothing left to wait for either way.
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Run an ordered list of tasks strictly one after another: task `i + 1` never
/// starts before task `i` has completed. An empty list completes immediately.
pub async fn serialize(tasks: Vec<Task>) -> Result<(), BarrierError> {
    let barrier = Barrier::new(Capacity::Bounded(1));
    for task in tasks {
        barrier.submit(task)?;
    }
    barrier.wait()?.await;
    Ok(())
}
