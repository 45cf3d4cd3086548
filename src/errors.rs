use std::io;

/// Ошибка выполнения отдельной задачи, доставляется через [`JoinHandle`](crate::handle::JoinHandle)
#[derive(Debug, PartialEq, PartialOrd, Eq, Ord, Clone, thiserror::Error)]
pub enum SpawnError {
    #[error("task panicked: {0}")]
    Panic(String),
    #[error("task was cancelled before it started")]
    Cancelled,
    #[error("task was discarded without running")]
    Discarded,
    #[error("timed out waiting for task result")]
    Timeout,
}

/// Ошибки операций над самим пулом
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// ОС отказала в создании потока воркера
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },

    /// Очередь заполнена, `try_submit` не стал ждать
    #[error("task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },
}
