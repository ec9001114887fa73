//! # Fabric Livy Testing
//!
//! Testing utilities for the Fabric Livy workspace.
//!
//! This crate provides:
//! - Deterministic [`Clock`] and [`Sleeper`] implementations
//! - JSON fixtures shaped like Livy and Fabric responses
//! - Path helpers for mounting `wiremock` routes
//!
//! ## Example
//!
//! ```
//! use fabric_livy_testing::{RecordingSleeper, test_environment};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (env, clock, sleeper) = test_environment();
//! env.sleeper.sleep(Duration::from_secs(45)).await;
//! assert_eq!(sleeper.total(), Duration::from_secs(45));
//! assert_eq!((env.clock.now() - clock.start()).num_seconds(), 45);
//! # }
//! ```

use chrono::{DateTime, Utc};
use fabric_livy_core::environment::{Clock, Environment, Sleeper};
use std::sync::Arc;

pub mod fixtures;
pub mod routes;

/// Mock implementations of the environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Sleeper, Utc};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use fabric_livy_testing::mocks::FixedClock;
    /// use fabric_livy_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        start: DateTime<Utc>,
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                start: time,
                now: Mutex::new(time),
            }
        }

        /// The time this clock started at.
        #[must_use]
        pub const fn start(&self) -> DateTime<Utc> {
            self.start
        }

        /// Move forward by `by`.
        pub fn advance(&self, by: Duration) {
            let by = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now = now.checked_add_signed(by).unwrap_or(*now);
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(test_clock().now())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Sleeper that returns at once and records every requested wait.
    ///
    /// When linked to a [`ManualClock`], each wait advances that clock, so
    /// deadline logic sees time pass without a real delay.
    #[derive(Debug, Default)]
    pub struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
        clock: Option<Arc<ManualClock>>,
    }

    impl RecordingSleeper {
        /// Unlinked sleeper.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Sleeper that advances `clock` on every wait.
        #[must_use]
        pub fn advancing(clock: Arc<ManualClock>) -> Self {
            Self {
                waits: Mutex::new(Vec::new()),
                clock: Some(clock),
            }
        }

        /// Every wait requested so far.
        #[must_use]
        pub fn waits(&self) -> Vec<Duration> {
            self.waits
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of waits requested so far.
        #[must_use]
        pub fn count(&self) -> usize {
            self.waits.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Sum of every wait requested so far.
        #[must_use]
        pub fn total(&self) -> Duration {
            self.waits().iter().sum()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            self.waits
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(duration);
            if let Some(clock) = &self.clock {
                clock.advance(duration);
            }
            // Yield so tasks racing the waiter (cancellation, other contexts) get to run.
            Box::pin(tokio::task::yield_now())
        }
    }
}

pub use mocks::{FixedClock, ManualClock, RecordingSleeper, test_clock};

/// Environment with a [`ManualClock`] and a [`RecordingSleeper`] linked to it.
///
/// Returns the environment plus handles to both parts.
#[must_use]
pub fn test_environment() -> (Environment, Arc<ManualClock>, Arc<RecordingSleeper>) {
    let clock = Arc::new(ManualClock::default());
    let sleeper = Arc::new(RecordingSleeper::advancing(Arc::clone(&clock)));
    let env = Environment::new(
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&sleeper) as Arc<dyn Sleeper>,
    );
    (env, clock, sleeper)
}

/// Install a test-writer `tracing` subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
