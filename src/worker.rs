use super::{
    handle::Task,
    pool::PoolShared,
};
use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, Thread},
};
use tokio_util::sync::CancellationToken;


/// Запись пула о воркере: поток, личный флаг остановки и отметка простоя.
///
/// Токен живёт и в записи, и в замыкании потока. При сжатии пула запись просто
/// дропается после `request_stop`, поток при этом отсоединяется и завершится сам.
pub(crate) struct WorkerHandle {
    id: usize,
    token: CancellationToken,
    idle: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn(id: usize, shared: Arc<PoolShared>, builder: thread::Builder) -> io::Result<Self> {
        let token = CancellationToken::new();
        let idle = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            id,
            shared,
            token: token.clone(),
            idle: idle.clone(),
        };
        let thread = builder.spawn(move || worker.run())?;

        Ok(Self {
            id,
            token,
            idle,
            thread: Some(thread),
        })
    }

    #[inline]
    pub fn request_stop(&self) {
        self.token.cancel();
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }

    pub fn thread(&self) -> Option<&Thread> {
        self.thread.as_ref().map(|handle| handle.thread())
    }

    /// Дождаться выхода потока воркера.
    ///
    /// Если пул дропнули из задачи на этом же воркере, свой поток не ждём:
    /// handle просто отсоединяется, воркер выйдет после текущей задачи.
    pub fn join(mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.thread().id() == thread::current().id() {
                tracing::debug!(worker = self.id, "stop called from own worker, detaching");
                return;
            }
            if handle.join().is_err() {
                tracing::error!(worker = self.id, "worker thread panicked");
            }
        }
    }
}


struct Worker {
    id: usize,
    shared: Arc<PoolShared>,
    token: CancellationToken,
    idle: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        if let Some(hook) = &self.shared.on_worker_start {
            hook(self.id);
        }
        tracing::debug!(worker = self.id, "worker started");

        let mut next = self.shared.queue.take();
        loop {
            while let Some(task) = next {
                task.run(self.id);
                // личный флаг проверяется только между задачами
                if self.token.is_cancelled() {
                    tracing::debug!(worker = self.id, "worker stopped by request");
                    return;
                }
                next = self.shared.queue.take();
            }

            next = self.park();
            if next.is_none() {
                break;
            }
        }

        tracing::debug!(worker = self.id, "worker stopped");
    }

    /// Простой: ждём задачу, graceful stop пула или свой флаг
    fn park(&self) -> Option<Task> {
        let shared = &self.shared;

        self.idle.store(true, Ordering::Release);
        shared.tracker.enter_idle();

        let next = shared
            .queue
            .take_or_wait(|| shared.done.load(Ordering::Acquire) || self.token.is_cancelled());

        shared.tracker.leave_idle();
        self.idle.store(false, Ordering::Release);

        next
    }
}
