//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness) so the
//! same state machines run against real clocks in production and a virtual
//! clock in the simulation harness.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleep.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards within one execution context
/// - `wall_clock_ms()` is non-decreasing within one execution context
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; the simulation
    /// harness uses a manually advanced virtual clock.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time in Unix milliseconds.
    ///
    /// Used only to stamp outbound frames with send time; never used for
    /// position projection (that's what [`Environment::now`] is for).
    fn wall_clock_ms(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// The only async method in the trait; used by driver/runtime code,
    /// never by protocol logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`, e.g. for session identifiers.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random `u128`, e.g. for room identifiers.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}

pub mod test_utils {
    //! Deterministic environment for tests.

    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use super::Environment;

    /// Interior state shared between clones of one [`MockEnv`].
    struct MockState {
        /// Virtual time elapsed since the base instant.
        elapsed: Duration,
        /// Deterministic xorshift RNG state.
        rng: u64,
    }

    /// Deterministic test environment with a manually advanced clock.
    ///
    /// Clones share the same clock, so an engine and the harness driving it
    /// observe identical time. `sleep()` resolves immediately; simulated
    /// time only moves via [`MockEnv::advance`].
    #[derive(Clone)]
    pub struct MockEnv {
        base: Instant,
        base_wall_ms: u64,
        state: Arc<Mutex<MockState>>,
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockEnv {
        /// Create a mock environment with a fixed seed.
        pub fn new() -> Self {
            Self::with_seed(0x5EED_0BAD_CAFE)
        }

        /// Create a mock environment with the given RNG seed.
        pub fn with_seed(seed: u64) -> Self {
            Self {
                base: Instant::now(),
                base_wall_ms: 1_700_000_000_000,
                state: Arc::new(Mutex::new(MockState {
                    elapsed: Duration::ZERO,
                    rng: seed | 1,
                })),
            }
        }

        /// Advance the virtual clock.
        pub fn advance(&self, duration: Duration) {
            if let Ok(mut state) = self.state.lock() {
                state.elapsed += duration;
            }
        }

        /// Virtual time elapsed since construction.
        pub fn elapsed(&self) -> Duration {
            self.state.lock().map(|s| s.elapsed).unwrap_or_default()
        }
    }

    impl Environment for MockEnv {
        type Instant = Instant;

        fn now(&self) -> Self::Instant {
            self.base + self.elapsed()
        }

        fn wall_clock_ms(&self) -> u64 {
            self.base_wall_ms + self.elapsed().as_millis() as u64
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            for byte in buffer {
                // xorshift64* - deterministic, not cryptographic
                state.rng ^= state.rng << 13;
                state.rng ^= state.rng >> 7;
                state.rng ^= state.rng << 17;
                *byte = (state.rng.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 56) as u8;
            }
        }
    }

}
