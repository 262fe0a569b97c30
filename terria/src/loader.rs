//! Memoised async loading.
//!
//! [`AsyncLoader`] wraps a "force load" function and guarantees that at most
//! one invocation is in flight at a time. Concurrent callers share the same
//! future; once a load has succeeded, later calls return immediately until
//! the owner calls [`AsyncLoader::invalidate`].
//!
//! ```text
//!   load() ──► in flight? ──yes──► await shared future
//!                 │no
//!                 ▼
//!             loaded? ──yes──► Ok(())
//!                 │no
//!                 ▼
//!          start force_load() as Shared, record it, await it
//! ```
//!
//! Each load runs on a spawned tokio task, so callers must be inside a tokio
//! runtime. A failed load is recorded (see [`AsyncLoader::error`]) but not memoised:
//! the next call starts a fresh attempt.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::TerriaError;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a single load attempt.
pub type LoadResult = Result<(), TerriaError>;

type ForceLoadFn = dyn Fn() -> BoxFuture<'static, LoadResult> + Send + Sync;
type InFlight = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Default)]
struct LoaderState {
    in_flight: Option<InFlight>,
    generation: u64,
    loaded: bool,
    error: Option<TerriaError>,
}

fn record(state: &Mutex<LoaderState>, name: &'static str, generation: u64, result: &LoadResult) {
    let mut state = state.lock();
    if state.generation != generation {
        return;
    }
    state.in_flight = None;
    match result {
        Ok(()) => {
            state.loaded = true;
            state.error = None;
        }
        Err(error) => {
            debug!(loader = name, error = %error, "Load failed");
            state.loaded = false;
            state.error = Some(error.clone());
        }
    }
}

/// At-most-one-in-flight wrapper around an async load function.
pub struct AsyncLoader {
    name: &'static str,
    force_load: Box<ForceLoadFn>,
    state: Arc<Mutex<LoaderState>>,
}

impl AsyncLoader {
    /// Creates a loader around `force_load`.
    ///
    /// `name` is only used for logging.
    pub fn new<F>(name: &'static str, force_load: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, LoadResult> + Send + Sync + 'static,
    {
        Self {
            name,
            force_load: Box::new(force_load),
            state: Arc::new(Mutex::new(LoaderState::default())),
        }
    }

    /// True while a load is in flight.
    pub fn is_loading(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// True once a load has completed successfully and not been invalidated.
    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    /// The error from the most recent failed load.
    pub fn error(&self) -> Option<TerriaError> {
        self.state.lock().error.clone()
    }

    /// Loads if necessary.
    ///
    /// Returns the shared in-flight future when a load is running, returns
    /// immediately when already loaded, and otherwise starts a new load.
    ///
    /// The load runs on its own tokio task and records its result there,
    /// so dropping the returned future does not abandon it.
    pub async fn load(&self) -> LoadResult {
        let future = {
            let mut state = self.state.lock();
            if let Some(in_flight) = &state.in_flight {
                in_flight.clone()
            } else if state.loaded {
                return Ok(());
            } else {
                state.generation += 1;
                debug!(loader = self.name, generation = state.generation, "Starting load");
                let future = self.spawn_load(state.generation);
                state.in_flight = Some(future.clone());
                future
            }
        };
        future.await
    }

    fn spawn_load(&self, generation: u64) -> InFlight {
        let name = self.name;
        let state = Arc::clone(&self.state);
        let load = (self.force_load)();
        let task = tokio::spawn(async move {
            let result = load.await;
            record(&state, name, generation, &result);
            result
        });
        let joined: BoxFuture<'static, LoadResult> = Box::pin(async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(TerriaError::from_error(format!("Load task failed: {}", e), None)),
            }
        });
        joined.shared()
    }

    /// Forces the next [`load`](Self::load) to call the load function again.
    ///
    /// A load in flight keeps running for its current callers, but the next
    /// call starts a fresh one and the detached result is not recorded.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.loaded = false;
        if state.in_flight.take().is_some() {
            state.generation += 1;
        }
    }

    /// Releases any retained future and error.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        state.in_flight = None;
        state.error = None;
        state.loaded = false;
        state.generation += 1;
    }
}

impl fmt::Debug for AsyncLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AsyncLoader")
            .field("name", &self.name)
            .field("is_loading", &state.in_flight.is_some())
            .field("loaded", &state.loaded)
            .field("error", &state.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn counting_loader(calls: Arc<AtomicUsize>) -> AsyncLoader {
        AsyncLoader::new("test", move || {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();
        let rx = Arc::new(Mutex::new(Some(rx)));

        let c = Arc::clone(&calls);
        let loader = AsyncLoader::new("gated", move || {
            c.fetch_add(1, Ordering::SeqCst);
            let rx = rx.lock().take();
            Box::pin(async move {
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
                Ok(())
            })
        });

        let first = loader.load();
        let second = loader.load();
        let release = async {
            tokio::task::yield_now().await;
            assert!(loader.is_loading());
            tx.send(()).unwrap();
        };

        let (a, b, ()) = tokio::join!(first, second, release);
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!loader.is_loading());
    }

    #[tokio::test]
    async fn test_load_is_memoised_after_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(Arc::clone(&calls));

        loader.load().await.unwrap();
        loader.load().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded());
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(Arc::clone(&calls));

        loader.load().await.unwrap();
        loader.invalidate();
        loader.load().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let loader = AsyncLoader::new("failing", move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n == 0 {
                    Err(TerriaError::from_error("first attempt fails", None))
                } else {
                    Ok(())
                }
            })
        });

        let err = loader.load().await.unwrap_err();
        assert_eq!(err.message(), "first attempt fails");
        assert_eq!(loader.error().unwrap().message(), "first attempt fails");
        assert!(!loader.is_loaded());

        loader.load().await.unwrap();
        assert!(loader.error().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_completes_after_caller_is_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let loader = AsyncLoader::new("slow", move || {
            c.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            })
        });

        let timed_out = tokio::time::timeout(Duration::from_millis(1), loader.load()).await;
        assert!(timed_out.is_err());
        assert!(loader.is_loading());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!loader.is_loading());
        assert!(loader.is_loaded());

        loader.load().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidated_load_is_not_recorded() {
        let (tx, rx) = oneshot::channel::<()>();
        let rx = Arc::new(Mutex::new(Some(rx)));
        let loader = AsyncLoader::new("gated", move || {
            let rx = rx.lock().take();
            Box::pin(async move {
                match rx {
                    Some(rx) => {
                        let _ = rx.await;
                        Err(TerriaError::from_error("stale", None))
                    }
                    None => Ok(()),
                }
            })
        });

        let stale = loader.load();
        let invalidate = async {
            tokio::task::yield_now().await;
            loader.invalidate();
            assert!(!loader.is_loading());
            tx.send(()).unwrap();
        };
        let (result, ()) = tokio::join!(stale, invalidate);
        assert!(result.is_err());
        assert!(loader.error().is_none());

        loader.load().await.unwrap();
        assert!(loader.is_loaded());
    }

    #[tokio::test]
    async fn test_dispose_clears_error() {
        let loader = AsyncLoader::new("failing", || {
            Box::pin(async { Err(TerriaError::from_error("nope", None)) })
        });
        assert!(loader.load().await.is_err());
        loader.dispose();
        assert!(loader.error().is_none());
    }
}
