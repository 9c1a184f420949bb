//! Time-coalescing buffer: delivers items in batches once input goes quiet.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use sandbox_core::prelude::*;

type FlushCallback<T> = Box<dyn Fn(Vec<T>) + Send + Sync + 'static>;

struct State<T> {
    items: Vec<T>,
    /// Bumped by every `add`; a timer only flushes if it is still current
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Inner<T> {
    period: Duration,
    state: Mutex<State<T>>,
    /// Held while delivering so batches reach the callback in order
    delivery: Mutex<()>,
    on_flush: FlushCallback<T>,
}

impl<T> Inner<T> {
    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, expected_generation: Option<u64>) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);

        let items = {
            let mut state = self.state();
            if expected_generation.is_some_and(|g| g != state.generation) {
                return;
            }
            match expected_generation {
                // Called from the timer task itself
                Some(_) => {
                    state.timer = None;
                }
                None => {
                    if let Some(timer) = state.timer.take() {
                        timer.abort();
                    }
                }
            }
            std::mem::take(&mut state.items)
        };

        if !items.is_empty() {
            trace!("Debounce flush of {} items", items.len());
            (self.on_flush)(items);
        }
    }
}

/// Collects items and hands them to a callback once no new item arrived for
/// `period`.
///
/// Every `add` restarts the quiet window. Each window that elapses produces
/// exactly one callback with every item added since the previous flush, in
/// append order. Cloning shares the buffer.
///
/// The callback must not call [`flush`](Self::flush) on the same buffer.
pub struct DebounceBuffer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DebounceBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for DebounceBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceBuffer")
            .field("period", &self.inner.period)
            .field("pending", &self.pending())
            .finish()
    }
}

impl<T: Send + 'static> DebounceBuffer<T> {
    pub fn new(period: Duration, on_flush: impl Fn(Vec<T>) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                period,
                state: Mutex::new(State {
                    items: Vec::new(),
                    generation: 0,
                    timer: None,
                }),
                delivery: Mutex::new(()),
                on_flush: Box::new(on_flush),
            }),
        }
    }

    /// Append an item and restart the quiet window.
    ///
    /// Outside a tokio runtime there is no timer; the item is delivered
    /// immediately.
    pub fn add(&self, item: T) {
        let mut state = self.inner.state();
        state.items.push(item);
        state.generation += 1;
        let generation = state.generation;

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let Ok(handle) = Handle::try_current() else {
            drop(state);
            self.flush();
            return;
        };

        let inner = Arc::clone(&self.inner);
        state.timer = Some(handle.spawn(async move {
            tokio::time::sleep(inner.period).await;
            inner.deliver(Some(generation));
        }));
    }

    /// Deliver everything pending now. No-op when empty.
    pub fn flush(&self) {
        self.inner.deliver(None);
    }
}

impl<T> DebounceBuffer<T> {
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Number of items waiting for the next flush
    pub fn pending(&self) -> usize {
        self.inner.state().items.len()
    }

    pub fn has_pending(&self) -> bool {
        self.pending() > 0
    }
}
