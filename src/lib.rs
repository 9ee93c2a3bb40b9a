//! Engine-vs-engine tournament runner: match execution and round-robin
//! scheduling for UCI-speaking chess engines.

pub mod adapters;
pub mod affinity;
pub mod cache;
pub mod config;
pub mod match_data;
pub mod match_runner;
pub mod opening_book;
pub mod output;
pub mod participant;
pub mod pgn;
pub mod process;
pub mod rules;
pub mod scheduler;
pub mod sprt;
pub mod stats;
pub mod uci;

pub type Res<T> = color_eyre::Result<T>;

/// Process-wide cancellation flag, set by the signal handler or by an SPRT
/// decision. Every suspension point in the crate observes this.
pub mod stop {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Shared handle to the global stop flag plus a notifier so waiters
    /// wake immediately instead of only on their next poll.
    #[derive(Clone)]
    pub struct StopFlag {
        flag: Arc<AtomicBool>,
        notify: Arc<Notify>,
    }

    impl Default for StopFlag {
        fn default() -> Self {
            Self {
                flag: Arc::new(AtomicBool::new(false)),
                notify: Arc::new(Notify::new()),
            }
        }
    }

    impl StopFlag {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_set(&self) -> bool {
            self.flag.load(Ordering::Acquire)
        }

        /// Sets the flag and wakes everyone waiting on it. Idempotent.
        pub fn set(&self) {
            self.flag.store(true, Ordering::Release);
            self.notify.notify_waiters();
        }

        /// Resolves once the flag becomes set; resolves immediately if it
        /// already is.
        pub async fn wait(&self) {
            if self.is_set() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}
