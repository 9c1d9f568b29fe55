//! Push-to-pull bridge for remote subscriptions.
//!
//! A remote streaming client pushes `next`, `error` and `complete` into a
//! [`SubscriptionSink`]; the single consumer pulls them out of the paired
//! [`RemoteStream`]. Both halves share one [`SubscriptionHandle`] state machine:
//!
//! ```text
//! INIT --activate--> ACTIVE --complete--> COMPLETE
//!   |                  |  \---error-----> ERRORED
//!   +------------------+------dispose---> DISPOSED
//! ```
//!
//! Events are delivered in the order they were pushed. Disposal (explicit or by
//! dropping the stream) discards undelivered events, runs the upstream dispose
//! function exactly once, and silences any later push.

use crate::error::Error;
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

/// Default number of undelivered events a subscription may hold.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Init,
    Active,
    Errored,
    Complete,
    Disposed,
}

impl SubscriptionState {
    fn accepts_events(self) -> bool {
        matches!(self, SubscriptionState::Init | SubscriptionState::Active)
    }
}

/// What to do when the consumer falls behind by more than the buffer capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Error the subscription and dispose the upstream stream
    #[default]
    Error,
    /// Discard the oldest undelivered event
    DropOldest,
}

/// Bound on undelivered events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

type DisposeFn = Box<dyn FnOnce() + Send>;

struct Shared<T> {
    state: SubscriptionState,
    pending: VecDeque<T>,
    error: Option<Error>,
    reader: Option<Waker>,
    dispose: Option<DisposeFn>,
    config: BufferConfig,
}

impl<T> Shared<T> {
    fn wake(&mut self) {
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
    }
}

/// State shared by the producing and consuming halves of one subscription.
pub struct SubscriptionHandle<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for SubscriptionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> SubscriptionHandle<T> {
    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SubscriptionState {
        self.lock().state
    }

    /// Number of events pushed but not yet pulled
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Move to DISPOSED and run the dispose function if it has not run yet.
    fn dispose(&self) {
        let dispose = {
            let mut shared = self.lock();
            if shared.state != SubscriptionState::Disposed {
                shared.state = SubscriptionState::Disposed;
                shared.pending.clear();
                shared.error = None;
                shared.reader = None;
            }
            shared.dispose.take()
        };
        if let Some(dispose) = dispose {
            dispose();
        }
    }
}

/// Create the two halves of a subscription.
pub fn channel<T>(config: BufferConfig) -> (SubscriptionSink<T>, RemoteStream<T>) {
    let handle = SubscriptionHandle {
        shared: Arc::new(Mutex::new(Shared {
            state: SubscriptionState::Init,
            pending: VecDeque::new(),
            error: None,
            reader: None,
            dispose: None,
            config: BufferConfig {
                capacity: config.capacity.max(1),
                ..config
            },
        })),
    };
    (
        SubscriptionSink {
            handle: handle.clone(),
        },
        RemoteStream { handle },
    )
}

/// Producer half, driven by the remote streaming client.
pub struct SubscriptionSink<T> {
    handle: SubscriptionHandle<T>,
}

impl<T> SubscriptionSink<T> {
    /// Record the upstream dispose function and move INIT -> ACTIVE.
    ///
    /// If the consumer already went away the function runs immediately.
    pub fn activate<F>(&self, dispose: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let run_now = {
            let mut shared = self.handle.lock();
            match shared.state {
                SubscriptionState::Disposed => Some(dispose),
                state => {
                    if state == SubscriptionState::Init {
                        shared.state = SubscriptionState::Active;
                    }
                    shared.dispose = Some(Box::new(dispose));
                    None
                }
            }
        };
        if let Some(dispose) = run_now {
            dispose();
        }
    }

    /// Push one event. Returns `false` once the consumer no longer wants events,
    /// which tells the producer to stop.
    pub fn next(&self, item: T) -> bool {
        let mut shared = self.handle.lock();
        if !shared.state.accepts_events() {
            return false;
        }

        if shared.pending.len() >= shared.config.capacity {
            if shared.config.overflow == OverflowPolicy::Error {
                let capacity = shared.config.capacity;
                shared.state = SubscriptionState::Errored;
                shared.error = Some(Error::SubscriptionOverflow(capacity));
                shared.wake();
                let dispose = shared.dispose.take();
                drop(shared);

                tracing::debug!(capacity, "subscription buffer overflow, disposing remote stream");
                if let Some(dispose) = dispose {
                    dispose();
                }
                return false;
            }
            shared.pending.pop_front();
            tracing::trace!("subscription buffer full, dropped oldest event");
        }

        shared.pending.push_back(item);
        shared.wake();
        true
    }

    /// Remote stream failed; the error is delivered after buffered events.
    pub fn error(&self, err: Error) {
        let mut shared = self.handle.lock();
        if shared.state.accepts_events() {
            shared.state = SubscriptionState::Errored;
            shared.error = Some(err);
            shared.wake();
        }
    }

    /// Remote stream finished; end-of-sequence follows buffered events.
    pub fn complete(&self) {
        let mut shared = self.handle.lock();
        if shared.state.accepts_events() {
            shared.state = SubscriptionState::Complete;
            shared.wake();
        }
    }

    /// Whether the consumer has disposed the subscription
    pub fn is_disposed(&self) -> bool {
        self.handle.state() == SubscriptionState::Disposed
    }
}

/// Consumer half: a pull-based, single-consumer, non-restartable sequence.
///
/// Yields `Ok(event)` in push order, then either ends or yields one `Err` and ends.
/// Dropping it disposes the subscription.
pub struct RemoteStream<T> {
    handle: SubscriptionHandle<T>,
}

impl<T> RemoteStream<T> {
    /// Stop the subscription. Safe to call more than once and after the remote
    /// stream completed or errored.
    pub fn dispose(&self) {
        self.handle.dispose();
    }

    pub fn state(&self) -> SubscriptionState {
        self.handle.state()
    }
}

impl<T> Stream for RemoteStream<T> {
    type Item = Result<T, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut shared = self.handle.lock();

        if let Some(item) = shared.pending.pop_front() {
            return Poll::Ready(Some(Ok(item)));
        }

        match shared.state {
            SubscriptionState::Complete | SubscriptionState::Disposed => Poll::Ready(None),
            SubscriptionState::Errored => Poll::Ready(shared.error.take().map(Err)),
            SubscriptionState::Init | SubscriptionState::Active => {
                shared.reader = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T> Drop for RemoteStream<T> {
    fn drop(&mut self) {
        self.handle.dispose();
    }
}

impl<T> std::fmt::Debug for RemoteStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.handle.lock();
        f.debug_struct("RemoteStream")
            .field("state", &shared.state)
            .field("pending", &shared.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_pending, assert_ready};

    fn counting_dispose() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&count);
        (count, move || {
            hook.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn delivers_in_order_then_ends() {
        let (sink, stream) = channel(BufferConfig::default());
        sink.activate(|| {});
        for i in 1..=3 {
            assert!(sink.next(i));
        }
        sink.complete();

        let items: Vec<i32> = stream.map(|r| r.expect("no error")).collect().await;
        assert_eq!(items, [1, 2, 3]);
    }

    #[tokio::test]
    async fn pending_reader_is_woken_by_each_callback() {
        let (sink, stream) = channel::<i32>(BufferConfig::default());
        let mut stream = tokio_test::task::spawn(stream);

        assert_pending!(stream.poll_next());
        sink.next(7);
        assert!(stream.is_woken());
        assert_eq!(assert_ready!(stream.poll_next()).map(|r| r.ok()), Some(Some(7)));

        assert_pending!(stream.poll_next());
        sink.complete();
        assert!(stream.is_woken());
        assert!(assert_ready!(stream.poll_next()).is_none());
    }

    #[tokio::test]
    async fn error_follows_buffered_events_once() {
        let (sink, mut stream) = channel(BufferConfig::default());
        sink.next(1);
        sink.error(Error::Remote("boom".into()));
        assert!(!sink.next(2), "events after an error are refused");

        assert_eq!(stream.next().await.map(|r| r.ok()), Some(Some(1)));
        let err = stream.next().await.expect("error item").expect_err("is error");
        assert!(matches!(err, Error::Remote(ref m) if m == "boom"));
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), SubscriptionState::Errored);
    }

    #[tokio::test]
    async fn dispose_mid_stream_silences_remote_and_runs_once() {
        let (count, dispose) = counting_dispose();
        let (sink, mut stream) = channel(BufferConfig::default());
        sink.activate(dispose);

        sink.next(1);
        assert_eq!(stream.next().await.map(|r| r.ok()), Some(Some(1)));

        stream.dispose();
        assert!(!sink.next(2));
        sink.next(3);
        sink.complete();

        assert!(stream.next().await.is_none());
        stream.dispose();
        drop(stream);
        assert!(sink.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispose_after_completion_is_safe() {
        let (count, dispose) = counting_dispose();
        let (sink, stream) = channel::<i32>(BufferConfig::default());
        sink.activate(dispose);
        sink.complete();

        stream.dispose();
        stream.dispose();
        assert_eq!(stream.state(), SubscriptionState::Disposed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn activation_after_consumer_left_disposes_immediately() {
        let (count, dispose) = counting_dispose();
        let (sink, stream) = channel::<i32>(BufferConfig::default());
        drop(stream);

        sink.activate(dispose);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!sink.next(1));
    }

    #[tokio::test]
    async fn overflow_errors_and_disposes_upstream() {
        let (count, dispose) = counting_dispose();
        let (sink, mut stream) = channel(BufferConfig {
            capacity: 2,
            overflow: OverflowPolicy::Error,
        });
        sink.activate(dispose);

        assert!(sink.next(1));
        assert!(sink.next(2));
        assert!(!sink.next(3));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert_eq!(stream.next().await.map(|r| r.ok()), Some(Some(1)));
        assert_eq!(stream.next().await.map(|r| r.ok()), Some(Some(2)));
        let err = stream.next().await.expect("error item").expect_err("overflow");
        assert!(matches!(err, Error::SubscriptionOverflow(2)));
        assert!(stream.next().await.is_none());

        drop(stream);
        assert_eq!(count.load(Ordering::SeqCst), 1, "dispose runs exactly once");
    }

    #[tokio::test]
    async fn drop_oldest_keeps_latest_events() {
        let (sink, stream) = channel(BufferConfig {
            capacity: 2,
            overflow: OverflowPolicy::DropOldest,
        });
        for i in 1..=4 {
            assert!(sink.next(i));
        }
        sink.complete();

        let items: Vec<i32> = stream.map(|r| r.expect("no error")).collect().await;
        assert_eq!(items, [3, 4]);
    }
}
