//! # SwarmCalib Runtime
//!
//! Clock and sleep abstractions used by the distributed fitness oracle while
//! it waits for job results.
//!
//! - **Tokio**: real monotonic clock and timer
//! - **Mock**: virtual clock that jumps forward on every sleep, for tests
//!
//! ## Feature Flags
//!
//! - `tokio` (default): Provide [`tokio_runtime::TokioRuntime`]

use core::future::Future;
use core::time::Duration;

/// Runtime trait for the oracle's polling loop
pub trait SwarmRuntime: Send + Sync + 'static {
    /// Milliseconds on a monotonic clock with an arbitrary origin
    fn now(&self) -> u64;

    /// Sleep for the specified duration
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

impl<R: SwarmRuntime> SwarmRuntime for std::sync::Arc<R> {
    fn now(&self) -> u64 {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        (**self).sleep(duration)
    }
}

#[cfg(feature = "tokio")]
pub mod tokio_runtime {
    //! Tokio-based runtime implementation

    use super::*;
    use std::time::Instant;

    /// Tokio runtime wrapper; `now()` counts from construction.
    #[derive(Debug, Clone)]
    pub struct TokioRuntime {
        origin: Instant,
    }

    impl TokioRuntime {
        /// Create a new Tokio runtime wrapper
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
            }
        }
    }

    impl Default for TokioRuntime {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SwarmRuntime for TokioRuntime {
        fn now(&self) -> u64 {
            self.origin.elapsed().as_millis() as u64
        }

        async fn sleep(&self, duration: Duration) {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Mock runtime for testing
pub mod mock_runtime {
    use super::*;
    use core::pin::Pin;
    use core::sync::atomic::{AtomicU64, Ordering};
    use core::task::{Context, Poll};

    /// Returns `Pending` once so other futures in the same join get polled.
    #[derive(Debug, Default)]
    struct YieldOnce {
        yielded: bool,
    }

    impl Future for YieldOnce {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.yielded {
                return Poll::Ready(());
            }
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }

    /// Virtual clock. Sleeping yields once, then moves the clock to at least
    /// `now + duration` as read when the sleep started. Sleepers joined at the
    /// same instant therefore advance it only once.
    #[derive(Debug, Default)]
    pub struct MockRuntime {
        current_time_ms: AtomicU64,
        sleeps: AtomicU64,
    }

    impl MockRuntime {
        /// Create a new mock runtime at time zero
        pub fn new() -> Self {
            Self::default()
        }

        /// Advance the mock clock
        pub fn advance(&self, duration: Duration) {
            self.current_time_ms
                .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        }

        /// Number of completed `sleep` calls
        pub fn sleep_count(&self) -> u64 {
            self.sleeps.load(Ordering::SeqCst)
        }
    }

    impl SwarmRuntime for MockRuntime {
        fn now(&self) -> u64 {
            self.current_time_ms.load(Ordering::SeqCst)
        }

        async fn sleep(&self, duration: Duration) {
            let wake = self.now().saturating_add(duration.as_millis() as u64);
            YieldOnce::default().await;
            self.current_time_ms.fetch_max(wake, Ordering::SeqCst);
            self.sleeps.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Get the default runtime based on features
#[cfg(feature = "tokio")]
pub fn default_runtime() -> tokio_runtime::TokioRuntime {
    tokio_runtime::TokioRuntime::new()
}

#[cfg(test)]
mod tests {
    use super::mock_runtime::MockRuntime;
    use super::*;

    #[tokio::test]
    async fn mock_sleep_advances_clock() {
        let rt = MockRuntime::new();
        assert_eq!(rt.now(), 0);
        rt.sleep(Duration::from_millis(250)).await;
        assert_eq!(rt.now(), 250);
        rt.advance(Duration::from_secs(1));
        assert_eq!(rt.now(), 1250);
        assert_eq!(rt.sleep_count(), 1);
    }

    #[tokio::test]
    async fn joined_mock_sleeps_do_not_stack() {
        let rt = MockRuntime::new();
        tokio::join!(
            rt.sleep(Duration::from_millis(100)),
            rt.sleep(Duration::from_millis(100)),
            rt.sleep(Duration::from_millis(40)),
        );
        assert_eq!(rt.now(), 100);
        assert_eq!(rt.sleep_count(), 3);

        rt.sleep(Duration::from_millis(50)).await;
        rt.sleep(Duration::from_millis(50)).await;
        assert_eq!(rt.now(), 200);
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn tokio_clock_is_monotonic() {
        let rt = default_runtime();
        let before = rt.now();
        rt.sleep(Duration::from_millis(20)).await;
        assert!(rt.now() >= before + 20);
    }

    #[tokio::test]
    async fn arc_runtime_delegates() {
        let rt = std::sync::Arc::new(MockRuntime::new());
        rt.sleep(Duration::from_millis(10)).await;
        assert_eq!(SwarmRuntime::now(&rt), 10);
    }
}
