use crossbeam::utils::CachePadded;
use std::sync::atomic::AtomicUsize;


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMetrics {
    pub workers: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    /// `usize::MAX` для очереди без ограничения
    pub queue_capacity: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub discarded_tasks: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.workers == 0 {
            return 0.0;
        }
        let busy = self.workers.saturating_sub(self.idle_workers);
        busy as f64 / self.workers as f64
    }

    /// Доля занятой ёмкости очереди, 1.0 - продюсеры `submit` уже ждут
    pub fn queue_pressure(&self) -> f64 {
        if self.queue_capacity == 0 {
            return 0.0;
        }
        self.queued_tasks as f64 / self.queue_capacity as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}


/// Счётчики задач, общие для пула и обёрток задач
#[derive(Default)]
pub(crate) struct TaskCounters {
    pub submitted: CachePadded<AtomicUsize>,
    pub completed: CachePadded<AtomicUsize>,
    pub failed: CachePadded<AtomicUsize>,
    pub discarded: CachePadded<AtomicUsize>,
}
