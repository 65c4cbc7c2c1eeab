//! Single worker task queue used to run bookkeeping off the request path.
//!
//! Tasks are executed one at a time, in submission order. Submitting to a full
//! queue waits for a free slot. Stopping the pool lets the running task finish
//! but does not drain the queue: tasks still buffered at that point are dropped.
use crate::metrics_defs::{TASKS_EXECUTED, TASKS_SUBMITTED};
use shared::counter;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A deferred, fire-and-forget unit of work. Tasks report their own failures.
pub struct Task {
    func: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    pub fn new(func: impl FnOnce() + Send + 'static) -> Self {
        Task {
            func: Box::new(func),
        }
    }

    /// A task consuming `data` when it runs.
    pub fn with_data<D>(data: D, func: impl FnOnce(D) + Send + 'static) -> Self
    where
        D: Send + 'static,
    {
        Task::new(move || func(data))
    }

    fn run(self) {
        (self.func)()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkPoolState {
    Running,
    // Quit was signalled, the worker finishes the task at hand.
    Draining,
    Stopped,
}

impl WorkPoolState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkPoolState::Running,
            1 => WorkPoolState::Draining,
            _ => WorkPoolState::Stopped,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum WorkPoolError {
    #[error("the work pool has been stopped")]
    Stopped,
}

/// Submission side of a [`WorkPool`]. Cheap to clone.
#[derive(Clone)]
pub struct WorkPoolHandle {
    tx: mpsc::Sender<Task>,
    state: Arc<AtomicU8>,
}

impl WorkPoolHandle {
    /// Queues a task, waiting while the queue is at capacity.
    pub async fn submit(&self, task: Task) -> Result<(), WorkPoolError> {
        if self.state() != WorkPoolState::Running {
            return Err(WorkPoolError::Stopped);
        }

        // Fails once the worker has exited and dropped the receiver
        self.tx.send(task).await.map_err(|_| WorkPoolError::Stopped)?;
        counter!(TASKS_SUBMITTED).increment(1);
        Ok(())
    }

    pub fn state(&self) -> WorkPoolState {
        WorkPoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkPoolState::Running
    }

    fn set_state(&self, state: WorkPoolState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

pub struct WorkPool {
    handle: WorkPoolHandle,
    quit: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl WorkPool {
    /// Spawns the worker. Must be called from within a tokio runtime.
    ///
    /// Dropping the pool without calling [`WorkPool::stop`] also stops the worker.
    pub fn start(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Task>(capacity);
        let (quit, quit_rx) = oneshot::channel();

        let handle = WorkPoolHandle {
            tx,
            state: Arc::new(AtomicU8::new(WorkPoolState::Running as u8)),
        };
        let worker = tokio::spawn(run_worker(rx, quit_rx));

        tracing::info!(capacity, "Work pool started");
        WorkPool {
            handle,
            quit,
            worker,
        }
    }

    pub fn handle(&self) -> WorkPoolHandle {
        self.handle.clone()
    }

    pub async fn submit(&self, task: Task) -> Result<(), WorkPoolError> {
        self.handle.submit(task).await
    }

    pub fn state(&self) -> WorkPoolState {
        self.handle.state()
    }

    /// Signals the worker to quit and waits for it to exit. Tasks still queued
    /// are not run.
    pub async fn stop(self) {
        self.handle.set_state(WorkPoolState::Draining);
        // The worker may already be gone if it panicked
        let _ = self.quit.send(());

        if let Err(e) = self.worker.await {
            tracing::error!("Work pool worker failed: {}", e);
        }
        self.handle.set_state(WorkPoolState::Stopped);
        tracing::info!("Work pool stopped");
    }
}

async fn run_worker(mut rx: mpsc::Receiver<Task>, mut quit: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            // Quit takes precedence over queued tasks
            biased;
            _ = &mut quit => break,
            task = rx.recv() => {
                let Some(task) = task else {
                    break;
                };
                // Task bodies do blocking I/O. Awaiting keeps them strictly sequential.
                match tokio::task::spawn_blocking(move || task.run()).await {
                    Ok(()) => counter!(TASKS_EXECUTED).increment(1),
                    Err(e) => tracing::error!("Task panicked: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    // A task that blocks the worker until the returned sender fires.
    fn blocking_task() -> (Task, oneshot::Receiver<()>, std::sync::mpsc::Sender<()>) {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let task = Task::new(move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
        });
        (task, started_rx, release_tx)
    }

    #[tokio::test]
    async fn test_tasks_run_in_order() {
        let pool = WorkPool::start(10);
        let executed = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let executed = executed.clone();
            pool.submit(Task::with_data(i, move |i| executed.lock().unwrap().push(i)))
                .await
                .unwrap();
        }

        wait_for(|| executed.lock().unwrap().len() == 10).await;
        pool.stop().await;

        assert_eq!(*executed.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_submit_waits_when_full() {
        let pool = WorkPool::start(1);
        let handle = pool.handle();
        let (task, started, release) = blocking_task();

        pool.submit(task).await.unwrap();
        started.await.unwrap();

        // Worker is busy, one slot in the queue
        handle.submit(Task::new(|| {})).await.unwrap();
        let blocked = timeout(Duration::from_millis(50), handle.submit(Task::new(|| {}))).await;
        assert!(blocked.is_err(), "submit should wait for a free slot");

        release.send(()).unwrap();
        timeout(Duration::from_secs(1), handle.submit(Task::new(|| {})))
            .await
            .expect("slot should free up")
            .unwrap();

        pool.stop().await;
    }

    #[tokio::test]
    async fn test_stop_does_not_drain() {
        let pool = WorkPool::start(5);
        let handle = pool.handle();
        let executed = Arc::new(Mutex::new(Vec::new()));
        let (task, started, release) = blocking_task();

        pool.submit(task).await.unwrap();
        started.await.unwrap();
        for i in 0..3 {
            let executed = executed.clone();
            pool.submit(Task::with_data(i, move |i| executed.lock().unwrap().push(i)))
                .await
                .unwrap();
        }

        let stopping = tokio::spawn(pool.stop());
        wait_for(|| handle.state() == WorkPoolState::Draining).await;
        assert_eq!(handle.submit(Task::new(|| {})).await, Err(WorkPoolError::Stopped));

        release.send(()).unwrap();
        stopping.await.unwrap();

        assert_eq!(handle.state(), WorkPoolState::Stopped);
        assert!(executed.lock().unwrap().is_empty());
        assert_eq!(handle.submit(Task::new(|| {})).await, Err(WorkPoolError::Stopped));
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_kill_worker() {
        let pool = WorkPool::start(2);
        let executed = Arc::new(Mutex::new(false));

        pool.submit(Task::new(|| panic!("boom"))).await.unwrap();
        let executed_clone = executed.clone();
        pool.submit(Task::new(move || *executed_clone.lock().unwrap() = true))
            .await
            .unwrap();

        wait_for(|| *executed.lock().unwrap()).await;
        assert!(pool.handle().is_running());
        pool.stop().await;
    }
}
