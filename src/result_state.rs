//! Request states and the single-slot channel that delivers them.

use tokio::sync::watch;

use crate::error::CatalogError;

/// State of the most recent request of a channel.
///
/// `Idle` only appears before the first request. Every request then publishes
/// `Loading` followed by at most one terminal `Success` or `Failure`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultState<T> {
    Idle,
    Loading,
    Success(T),
    Failure(CatalogError),
}

impl<T> ResultState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, ResultState::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultState::Success(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResultState::Success(_) | ResultState::Failure(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ResultState::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CatalogError> {
        match self {
            ResultState::Failure(err) => Some(err),
            _ => None,
        }
    }
}

/// Single-slot broadcast of [`ResultState`]s.
///
/// Only the latest state is retained. A subscriber attaching late (or re-attaching)
/// sees that state immediately without anything being fetched again. A subscriber
/// that falls behind only sees the newest state, so a short `Loading` can be skipped
/// entirely.
#[derive(Debug)]
pub struct ResultChannel<T> {
    tx: watch::Sender<ResultState<T>>,
}

impl<T: Clone> ResultChannel<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ResultState::Idle);
        Self { tx }
    }

    /// Publishes `Loading` for a new request.
    pub fn begin(&self) {
        self.tx.send_replace(ResultState::Loading);
    }

    /// Publishes the terminal state of the current request.
    pub fn finish(&self, state: ResultState<T>) {
        debug_assert!(state.is_terminal(), "finish() expects Success or Failure");
        self.tx.send_replace(state);
    }

    pub fn current(&self) -> ResultState<T> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> ResultSubscription<T> {
        ResultSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone> Default for ResultChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A consumer's view of a [`ResultChannel`]. Dropping it detaches the consumer.
#[derive(Debug)]
pub struct ResultSubscription<T> {
    rx: watch::Receiver<ResultState<T>>,
}

impl<T: Clone> ResultSubscription<T> {
    /// Last state published on the channel.
    pub fn current(&self) -> ResultState<T> {
        self.rx.borrow().clone()
    }

    /// Waits for the next published state. Returns `None` once the channel is gone.
    pub async fn changed(&mut self) -> Option<ResultState<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Waits until the channel holds a `Success` or `Failure`.
    pub async fn wait_terminal(&mut self) -> Option<ResultState<T>> {
        let state = self.rx.borrow_and_update().clone();
        if state.is_terminal() {
            return Some(state);
        }
        loop {
            let state = self.changed().await?;
            if state.is_terminal() {
                return Some(state);
            }
        }
    }
}
