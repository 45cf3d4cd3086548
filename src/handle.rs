use super::{
    errors::SpawnError,
    result::SpawnResult,
};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll}
};
use tokio::{
    sync::oneshot::{self, error::TryRecvError},
    time::Duration,
};
use tokio_util::sync::CancellationToken;


/// Единица работы без типа результата: получает id воркера, который её выполняет.
/// Выполняется не более одного раза, владение переходит продюсер -> очередь -> воркер.
pub struct Task {
    body: Box<dyn FnOnce(usize) + Send + 'static>,
}

impl Task {
    pub(crate) fn new<F>(body: F) -> Self
    where
        F: FnOnce(usize) + Send + 'static,
    {
        Self { body: Box::new(body) }
    }

    /// Выполнить задачу на текущем потоке от имени воркера `worker_id`
    #[inline]
    pub fn run(self, worker_id: usize) {
        (self.body)(worker_id)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}


/// Handle на результат задачи с поддержкой отмены и timeout.
///
/// Можно `.await`-ить из async кода, либо блокироваться через [`JoinHandle::wait`]
/// из обычного потока. Если задача была выброшена из очереди (forced stop,
/// `clear_queue`, drop без запуска) - результатом будет [`SpawnError::Discarded`].
pub struct JoinHandle<T> {
    cancel_token: CancellationToken,
    receiver: oneshot::Receiver<SpawnResult<T>>,
}

impl<T> JoinHandle<T> {

    pub(crate) fn new
    (
        cancel_token: CancellationToken,
        receiver: oneshot::Receiver<SpawnResult<T>>,
    ) -> Self {
        Self {
            cancel_token,
            receiver
        }
    }

    /// Отменить задачу, если воркер её ещё не взял. Уже запущенная задача доработает до конца.
    #[inline]
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Заблокировать текущий поток до получения результата.
    ///
    /// # Panics
    ///
    /// Паникует при вызове внутри async контекста tokio, там нужно `.await`.
    pub fn wait(self) -> SpawnResult<T> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(SpawnError::Discarded))
    }

    /// Неблокирующая проверка. `None` - результата пока нет.
    /// Результат отдаётся один раз, следующие вызовы вернут `Discarded`.
    pub fn try_wait(&mut self) -> Option<SpawnResult<T>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(SpawnError::Discarded)),
        }
    }

    pub async fn await_timeout(self, timeout: Duration) -> SpawnResult<T> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SpawnError::Discarded),
            Err(_) => Err(SpawnError::Timeout),
        }
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = SpawnResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(SpawnError::Discarded))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Дождаться всех handles, результаты в порядке исходной коллекции
pub async fn join_all<T, I>(handles: I) -> Vec<SpawnResult<T>>
where
    I: IntoIterator<Item = JoinHandle<T>>,
{
    futures::future::join_all(handles).await
}
