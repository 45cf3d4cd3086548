use super::handle::Task;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;


struct State {
    tasks: VecDeque<Task>,
    capacity: usize,
}

/// FIFO очередь задач с ограниченной ёмкостью.
///
/// Один mutex на всё состояние и две condvar: `not_empty` будит воркеров,
/// `not_full` будит продюсеров, упёршихся в ёмкость.
pub(crate) struct TaskQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl TaskQueue {
    /// `None` - очередь без ограничения
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(State {
                tasks: VecDeque::new(),
                capacity: clamp_capacity(capacity.unwrap_or(usize::MAX)),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Положить задачу в хвост. Если очередь заполнена - ждём, пока кто-то не заберёт элемент.
    pub fn push(&self, task: Task) {
        let mut state = self.state.lock();
        self.not_full
            .wait_while(&mut state, |s| s.tasks.len() >= s.capacity);
        state.tasks.push_back(task);
        drop(state);
        self.not_empty.notify_one();
    }

    /// Как `push`, но без ожидания: при заполненной очереди задача возвращается обратно
    pub fn try_push(&self, task: Task) -> Result<(), Task> {
        let mut state = self.state.lock();
        if state.tasks.len() >= state.capacity {
            return Err(task);
        }
        state.tasks.push_back(task);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    pub fn take(&self) -> Option<Task> {
        let task = self.state.lock().tasks.pop_front();
        if task.is_some() {
            self.not_full.notify_one();
        }
        task
    }

    /// Забрать задачу или дождаться, пока `stop` не станет true.
    ///
    /// Оба условия перепроверяются под локом после каждого пробуждения.
    /// Задача в очереди всегда важнее запроса на остановку.
    pub fn take_or_wait<P>(&self, stop: P) -> Option<Task>
    where
        P: Fn() -> bool,
    {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.tasks.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(task);
            }
            if stop() {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Выбросить все ожидающие задачи, вернуть их количество
    pub fn clear(&self) -> usize {
        let drained: Vec<Task> = self.state.lock().tasks.drain(..).collect();
        self.not_full.notify_all();
        // drop вне лока: задачи могут держать что угодно
        let count = drained.len();
        drop(drained);
        count
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.state.lock().capacity = clamp_capacity(capacity);
        self.not_full.notify_all();
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }

    /// Разбудить всех ждущих. Лок берётся специально: флаг, выставленный до вызова,
    /// гарантированно увидит воркер, который как раз проверял предикат.
    pub fn wake_all(&self) {
        let _guard = self.state.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

fn clamp_capacity(capacity: usize) -> usize {
    if capacity == 0 {
        tracing::warn!("queue capacity 0 would block every submit, using 1");
        return 1;
    }
    capacity
}
