//! Пул OS-потоков для блокирующих задач с асинхронной доставкой результатов
//!
//! # Features
//! - Ограниченная FIFO очередь с backpressure для продюсеров
//! - Изменение числа воркеров на лету
//! - Graceful и forced shutdown
//! - Паники задач изолированы и приходят в handle как ошибки
//! - Гистограмма времени простоя воркеров в лог
//!
//! ```no_run
//! use task_pool::ThreadPool;
//!
//! let pool = ThreadPool::new(4).unwrap();
//! let handle = pool.submit(|worker_id| worker_id * 2);
//! let _doubled = handle.wait().unwrap();
//! pool.stop(true);
//! ```

pub mod errors;
pub mod handle;
pub mod model;
pub mod pool;
pub mod result;
pub mod tracker;

mod queue;
mod worker;

pub use errors::{PoolError, SpawnError};
pub use handle::{join_all, JoinHandle, Task};
pub use pool::{Config, StartHook, ThreadPool};
pub use result::SpawnResult;
