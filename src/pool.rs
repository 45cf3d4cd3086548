use super::{
    errors::{PoolError, SpawnError},
    result::SpawnResult,
    handle::{
        Task,
        JoinHandle,
    },
    model::{
        PoolMetrics,
        TaskCounters,
    },
    queue::TaskQueue,
    tracker::{IdleHistogram, IdleTracker, DEFAULT_REPORT_INTERVAL},
    worker::WorkerHandle,
};
use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, Thread},
    time::Duration,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;


/// Хук, вызываемый один раз на старте каждого воркера с его id.
/// Например, чтобы ограничить вложенный параллелизм числовых библиотек одним потоком.
pub type StartHook = Arc<dyn Fn(usize) + Send + Sync + 'static>;

/// Конфигурация пула потоков
#[derive(Clone)]
pub struct Config {
    pub num_threads: usize,
    /// `None` - очередь без ограничения
    pub queue_capacity: Option<usize>,
    pub thread_name: String,
    pub stack_size: Option<usize>,
    pub idle_report_interval: Duration,
    pub on_worker_start: Option<StartHook>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            queue_capacity: None,
            thread_name: "task-pool".to_string(),
            stack_size: None,
            idle_report_interval: DEFAULT_REPORT_INTERVAL,
            on_worker_start: None,
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            num_threads: num_cpus,
            queue_capacity: Some(num_cpus * 10),
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        Self {
            num_threads: num_cpus::get() * 2, // воркеры большую часть времени ждут
            ..Default::default()
        }
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Ограничить очередь. 0 при создании пула поднимается до 1
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn idle_report_interval(mut self, interval: Duration) -> Self {
        self.idle_report_interval = interval;
        self
    }

    pub fn on_worker_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.on_worker_start = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("num_threads", &self.num_threads)
            .field("queue_capacity", &self.queue_capacity)
            .field("thread_name", &self.thread_name)
            .field("stack_size", &self.stack_size)
            .field("idle_report_interval", &self.idle_report_interval)
            .field("on_worker_start", &self.on_worker_start.is_some())
            .finish()
    }
}


/// Состояние, которое делят пул и потоки воркеров
pub(crate) struct PoolShared {
    pub queue: TaskQueue,
    pub tracker: IdleTracker,
    /// graceful stop: воркеры дорабатывают очередь и выходят
    pub done: AtomicBool,
    /// forced stop: очередь выброшена, флаги всех воркеров выставлены
    pub stopped: AtomicBool,
    pub counters: Arc<TaskCounters>,
    pub on_worker_start: Option<StartHook>,
}


/// Пул OS-потоков с общей ограниченной очередью задач.
///
/// `resize` и `stop` сериализуются внутренним локом, `submit` можно звать
/// из любого числа потоков одновременно. При drop выполняется graceful stop.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<WorkerHandle>>,
    thread_name: String,
    stack_size: Option<usize>,
}

impl ThreadPool {
    pub fn new(num_threads: usize) -> Result<Self, PoolError> {
        let config = Config {
            num_threads,
            ..Default::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self, PoolError> {
        let shared = Arc::new(PoolShared {
            queue: TaskQueue::new(config.queue_capacity),
            tracker: IdleTracker::new(config.idle_report_interval),
            done: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            counters: Arc::new(TaskCounters::default()),
            on_worker_start: config.on_worker_start,
        });

        let pool = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(config.num_threads)),
            thread_name: config.thread_name,
            stack_size: config.stack_size,
        };

        // при ошибке уже запущенные воркеры остановит drop пула
        pool.resize(config.num_threads)?;

        tracing::info!(
            pool = %pool.thread_name,
            workers = config.num_threads,
            capacity = pool.shared.queue.capacity(),
            "thread pool created"
        );

        Ok(pool)
    }

    fn thread_builder(&self, id: usize) -> thread::Builder {
        let builder = thread::Builder::new().name(format!("{}-{}", self.thread_name, id));
        match self.stack_size {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }

    /// Изменить число воркеров.
    ///
    /// Рост запускает новые потоки. При сжатии лишние воркеры (с наибольшими id)
    /// получают флаг остановки и отсоединяются: `resize` их не ждёт, занятый воркер
    /// доделает текущую задачу и выйдет сам. После любого stop вызов ничего не делает.
    pub fn resize(&self, num_threads: usize) -> Result<(), PoolError> {
        let mut workers = self.workers.lock();
        if self.is_stopped() {
            return Ok(());
        }

        let current = workers.len();
        if num_threads >= current {
            workers.reserve(num_threads - current);
            for id in current..num_threads {
                let worker = WorkerHandle::spawn(id, self.shared.clone(), self.thread_builder(id))
                    .map_err(|source| PoolError::Spawn { worker: id, source })?;
                workers.push(worker);
            }
        } else {
            for worker in workers.drain(num_threads..) {
                worker.request_stop();
            }
            self.shared.queue.wake_all();
        }

        if current != num_threads {
            tracing::info!(pool = %self.thread_name, from = current, to = num_threads, "thread pool resized");
        }
        Ok(())
    }

    /// Поставить задачу в очередь. Блокирует, пока очередь заполнена.
    ///
    /// Замыкание получает id воркера, который его выполняет. Паника внутри
    /// задачи не трогает воркер и приходит в handle как [`SpawnError::Panic`].
    pub fn submit<R, F>(&self, f: F) -> JoinHandle<R>
    where
        R: Send + 'static,
        F: FnOnce(usize) -> R + Send + 'static,
    {
        let (task, handle) = self.wrap(f);
        // до push: воркер может завершить задачу раньше, чем мы вернёмся
        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.queue.push(task);
        handle
    }

    /// `submit` с привязанными аргументами
    pub fn submit_with<A, R, F>(&self, f: F, args: A) -> JoinHandle<R>
    where
        A: Send + 'static,
        R: Send + 'static,
        F: FnOnce(usize, A) -> R + Send + 'static,
    {
        self.submit(move |worker_id| f(worker_id, args))
    }

    /// Как `submit`, но при заполненной очереди сразу возвращает [`PoolError::QueueFull`]
    pub fn try_submit<R, F>(&self, f: F) -> Result<JoinHandle<R>, PoolError>
    where
        R: Send + 'static,
        F: FnOnce(usize) -> R + Send + 'static,
    {
        let (task, handle) = self.wrap(f);
        let counters = &self.shared.counters;
        counters.submitted.fetch_add(1, Ordering::Relaxed);
        match self.shared.queue.try_push(task) {
            Ok(()) => Ok(handle),
            Err(_rejected) => {
                counters.submitted.fetch_sub(1, Ordering::Relaxed);
                Err(PoolError::QueueFull {
                    capacity: self.shared.queue.capacity(),
                })
            }
        }
    }

    fn wrap<R, F>(&self, f: F) -> (Task, JoinHandle<R>)
    where
        R: Send + 'static,
        F: FnOnce(usize) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<SpawnResult<R>>();
        let cancel_token = CancellationToken::new();
        let ct = cancel_token.clone();
        let counters = self.shared.counters.clone();

        let task = Task::new(move |worker_id| {
            if ct.is_cancelled() {
                counters.discarded.fetch_add(1, Ordering::Release);
                let _ = tx.send(Err(SpawnError::Cancelled));
                return;
            }

            let result: SpawnResult<R> = panic::catch_unwind(AssertUnwindSafe(|| f(worker_id)))
                .map_err(|payload| SpawnError::Panic(panic_message(payload.as_ref())));

            if result.is_ok() {
                counters.completed.fetch_add(1, Ordering::Release);
            } else {
                counters.failed.fetch_add(1, Ordering::Release);
            }

            let _ = tx.send(result);
        });

        (task, JoinHandle::new(cancel_token, rx))
    }

    /// Остановить пул.
    ///
    /// `wait == true`: воркеры дорабатывают всё, что уже в очереди, затем выходят.
    /// `wait == false`: ожидающие задачи выбрасываются без запуска, уже
    /// выполняющиеся доделываются. В обоих случаях вызов ждёт завершения всех
    /// собственных потоков. Повторный вызов ничего не делает.
    pub fn stop(&self, wait: bool) {
        let mut workers = self.workers.lock();
        if wait {
            if self.is_stopped() {
                return;
            }
            self.shared.done.store(true, Ordering::Release);
        } else {
            if self.shared.stopped.swap(true, Ordering::AcqRel) {
                return;
            }
            for worker in workers.iter() {
                worker.request_stop();
            }
            self.clear_queue();
        }
        self.shared.queue.wake_all();

        let owned: Vec<WorkerHandle> = workers.drain(..).collect();
        drop(workers);
        let joined = owned.len();
        for worker in owned {
            worker.join();
        }

        // задачи, которые некому было взять (пул без воркеров)
        let discarded = if self.shared.queue.is_empty() { 0 } else { self.clear_queue() };
        tracing::info!(pool = %self.thread_name, graceful = wait, joined, discarded, "thread pool stopped");
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.shared.done.load(Ordering::Acquire) || self.shared.stopped.load(Ordering::Acquire)
    }

    /// Выбросить все ожидающие задачи без запуска. Их handles получат `Discarded`.
    pub fn clear_queue(&self) -> usize {
        let discarded = self.shared.queue.clear();
        self.shared.counters.discarded.fetch_add(discarded, Ordering::Release);
        discarded
    }

    /// Забрать следующую задачу из очереди, не запуская её
    pub fn pop(&self) -> Option<Task> {
        self.shared.queue.take()
    }

    /// Ёмкость 0 поднимается до 1
    pub fn set_queue_capacity(&self, capacity: usize) {
        self.shared.queue.set_capacity(capacity);
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    pub fn queued_tasks(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn size(&self) -> usize {
        self.workers.lock().len()
    }

    /// Простаивающие воркеры среди принадлежащих пулу, поэтому всегда `<= size()`
    pub fn idle_count(&self) -> usize {
        self.workers.lock().iter().filter(|w| w.is_idle()).count()
    }

    pub fn thread(&self, index: usize) -> Option<Thread> {
        self.workers.lock().get(index).and_then(|w| w.thread().cloned())
    }

    pub fn idle_histogram(&self) -> IdleHistogram {
        self.shared.tracker.snapshot()
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        let (workers, idle_workers) = {
            let workers = self.workers.lock();
            (workers.len(), workers.iter().filter(|w| w.is_idle()).count())
        };
        let counters = &self.shared.counters;
        // завершения читаются раньше submitted: снимок не покажет завершённых больше, чем поставленных
        let completed_tasks = counters.completed.load(Ordering::Acquire);
        let failed_tasks = counters.failed.load(Ordering::Acquire);
        let discarded_tasks = counters.discarded.load(Ordering::Acquire);
        PoolMetrics {
            workers,
            idle_workers,
            queued_tasks: self.shared.queue.len(),
            queue_capacity: self.shared.queue.capacity(),
            total_submitted: counters.submitted.load(Ordering::Relaxed),
            completed_tasks,
            failed_tasks,
            discarded_tasks,
        }
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.thread_name)
            .field("size", &self.size())
            .field("queued", &self.queued_tasks())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop(true);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
