//! Диагностика простоя: сколько времени пул провёл при каждом значении
//! "сейчас простаивает N воркеров". Раз в интервал гистограмма уходит в лог и обнуляется.

use parking_lot::Mutex;
use std::{
    mem,
    time::{Duration, Instant},
};

/// Число корзин гистограммы, значения от `HISTOGRAM_BUCKETS - 1` складываются в последнюю
pub const HISTOGRAM_BUCKETS: usize = 64;

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);


#[derive(Debug, Clone, PartialEq)]
pub struct IdleHistogram {
    buckets: Vec<Duration>,
    total: Duration,
}

impl Default for IdleHistogram {
    fn default() -> Self {
        Self {
            buckets: vec![Duration::ZERO; HISTOGRAM_BUCKETS],
            total: Duration::ZERO,
        }
    }
}

impl IdleHistogram {
    #[inline]
    fn bucket(idle: usize) -> usize {
        idle.min(HISTOGRAM_BUCKETS - 1)
    }

    fn add(&mut self, idle: usize, elapsed: Duration) {
        self.buckets[Self::bucket(idle)] += elapsed;
        self.total += elapsed;
    }

    /// Накопленное время при `idle` простаивающих воркерах
    pub fn time_at(&self, idle: usize) -> Duration {
        self.buckets[Self::bucket(idle)]
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Непустые корзины: (число простаивающих, время)
    pub fn iter(&self) -> impl Iterator<Item = (usize, Duration)> + '_ {
        self.buckets
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, time)| !time.is_zero())
    }

    fn report(&self) {
        tracing::info!("idle histogram start");
        for (idle, time) in self.iter() {
            tracing::info!(idle, seconds = time.as_secs_f64(), "idle time");
        }
        tracing::info!(total_seconds = self.total.as_secs_f64(), "idle histogram end");
    }
}


struct TrackerState {
    current: usize,
    changed_at: Instant,
    flushed_at: Instant,
    histogram: IdleHistogram,
}

pub struct IdleTracker {
    state: Mutex<TrackerState>,
    report_interval: Duration,
}

impl Default for IdleTracker {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_INTERVAL)
    }
}

impl IdleTracker {
    pub fn new(report_interval: Duration) -> Self {
        Self::starting_at(report_interval, Instant::now())
    }

    fn starting_at(report_interval: Duration, now: Instant) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                current: 0,
                changed_at: now,
                flushed_at: now,
                histogram: IdleHistogram::default(),
            }),
            report_interval,
        }
    }

    /// Воркер уходит в простой. Счётчик и гистограмма меняются под одним локом,
    /// поэтому переходы разных воркеров не переставляются. Возвращает новое значение.
    pub fn enter_idle(&self) -> usize {
        self.step(true, Instant::now())
    }

    /// Воркер вышел из простоя, возвращает новое значение счётчика
    pub fn leave_idle(&self) -> usize {
        self.step(false, Instant::now())
    }

    /// Выставить число простаивающих воркеров напрямую
    pub fn on_idle_count_changed(&self, idle: usize) {
        if let Some(histogram) = self.record(idle, Instant::now()) {
            histogram.report();
        }
    }

    /// Текущее число простаивающих воркеров
    pub fn idle(&self) -> usize {
        self.state.lock().current
    }

    /// Копия гистограммы с момента последнего сброса
    pub fn snapshot(&self) -> IdleHistogram {
        self.state.lock().histogram.clone()
    }

    fn step(&self, entering: bool, now: Instant) -> usize {
        let (idle, report) = {
            let mut state = self.state.lock();
            let idle = if entering {
                state.current + 1
            } else {
                state.current.saturating_sub(1)
            };
            (idle, self.apply(&mut state, idle, now))
        };
        if let Some(histogram) = report {
            histogram.report();
        }
        idle
    }

    fn record(&self, idle: usize, now: Instant) -> Option<IdleHistogram> {
        let mut state = self.state.lock();
        self.apply(&mut state, idle, now)
    }

    /// Обновляет состояние и, если пора, забирает гистограмму для лога.
    /// Логирование идёт уже после отпускания лока.
    fn apply(&self, state: &mut TrackerState, idle: usize, now: Instant) -> Option<IdleHistogram> {
        if idle != state.current {
            let elapsed = now.saturating_duration_since(state.changed_at);
            let previous = state.current;
            state.histogram.add(previous, elapsed);
            state.current = idle;
            state.changed_at = now;
        }

        if now.saturating_duration_since(state.flushed_at) >= self.report_interval {
            state.flushed_at = now;
            return Some(mem::take(&mut state.histogram));
        }
        None
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn time_goes_to_the_previous_value() {
        let t0 = Instant::now();
        let tracker = IdleTracker::starting_at(Duration::from_secs(3600), t0);

        assert!(tracker.record(2, t0 + SEC).is_none());
        assert!(tracker.record(5, t0 + 4 * SEC).is_none());

        let histogram = tracker.snapshot();
        assert_eq!(histogram.time_at(0), SEC);
        assert_eq!(histogram.time_at(2), 3 * SEC);
        assert_eq!(histogram.time_at(5), Duration::ZERO);
        assert_eq!(histogram.total(), 4 * SEC);
    }

    #[test]
    fn repeated_value_does_not_accumulate() {
        let t0 = Instant::now();
        let tracker = IdleTracker::starting_at(Duration::from_secs(3600), t0);

        tracker.record(1, t0 + SEC);
        tracker.record(1, t0 + 2 * SEC);
        tracker.record(1, t0 + 3 * SEC);

        let histogram = tracker.snapshot();
        assert_eq!(histogram.time_at(1), Duration::ZERO);
        assert_eq!(histogram.total(), SEC);

        tracker.record(0, t0 + 5 * SEC);
        assert_eq!(tracker.snapshot().time_at(1), 4 * SEC);
    }

    #[test]
    fn flush_returns_and_resets_histogram() {
        let t0 = Instant::now();
        let tracker = IdleTracker::starting_at(Duration::from_secs(10), t0);

        assert!(tracker.record(3, t0 + 2 * SEC).is_none());

        let flushed = tracker
            .record(4, t0 + 10 * SEC)
            .expect("interval elapsed, histogram must be flushed");
        assert_eq!(flushed.time_at(0), 2 * SEC);
        assert_eq!(flushed.time_at(3), 8 * SEC);
        assert_eq!(flushed.total(), 10 * SEC);
        assert_eq!(flushed.iter().count(), 2);

        assert_eq!(tracker.snapshot(), IdleHistogram::default());

        // следующий сброс не раньше чем через интервал
        assert!(tracker.record(1, t0 + 15 * SEC).is_none());
        assert_eq!(tracker.snapshot().time_at(4), 5 * SEC);
    }

    #[test]
    fn large_idle_counts_share_last_bucket() {
        let t0 = Instant::now();
        let tracker = IdleTracker::starting_at(Duration::from_secs(3600), t0);

        tracker.record(100, t0);
        tracker.record(200, t0 + SEC);
        tracker.record(0, t0 + 3 * SEC);

        let histogram = tracker.snapshot();
        assert_eq!(histogram.time_at(HISTOGRAM_BUCKETS - 1), 3 * SEC);
        assert_eq!(histogram.time_at(500), 3 * SEC);
    }

    #[test]
    fn enter_and_leave_update_count_and_buckets_together() {
        let t0 = Instant::now();
        let tracker = IdleTracker::starting_at(Duration::from_secs(3600), t0);

        assert_eq!(tracker.step(true, t0 + SEC), 1);
        assert_eq!(tracker.step(true, t0 + 2 * SEC), 2);
        assert_eq!(tracker.step(false, t0 + 5 * SEC), 1);
        assert_eq!(tracker.idle(), 1);

        let histogram = tracker.snapshot();
        assert_eq!(histogram.time_at(0), SEC);
        assert_eq!(histogram.time_at(1), SEC);
        assert_eq!(histogram.time_at(2), 3 * SEC);

        // ниже нуля счётчик не уходит
        assert_eq!(tracker.step(false, t0 + 6 * SEC), 0);
        assert_eq!(tracker.step(false, t0 + 7 * SEC), 0);
    }

    #[test]
    fn concurrent_transitions_leave_consistent_count() {
        let tracker = Arc::new(IdleTracker::new(Duration::from_secs(3600)));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let entered = tracker.enter_idle();
                        assert!((1..=8).contains(&entered));
                        let left = tracker.leave_idle();
                        assert!(left < 8);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        // последнее записанное значение совпадает с реальным числом простаивающих
        assert_eq!(tracker.idle(), 0);
    }
}
