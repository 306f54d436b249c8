//! One-time availability probe for the host model.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::llm::{Availability, LanguageModelHost};

/// Probes the host once and caches the answer for the probe's lifetime.
///
/// Failures of the probe itself, including a panicking host, are reported as
/// `Unavailable` and never surface to callers.
pub struct AvailabilityProbe {
    host: Arc<dyn LanguageModelHost>,
    result: OnceCell<Availability>,
    checking: AtomicBool,
}

/// Clears the checking flag even if the probe future is dropped mid-flight.
struct CheckingGuard<'a>(&'a AtomicBool);

impl Drop for CheckingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AvailabilityProbe {
    pub fn new(host: Arc<dyn LanguageModelHost>) -> Self {
        Self {
            host,
            result: OnceCell::new(),
            checking: AtomicBool::new(false),
        }
    }

    /// Return the cached availability, probing the host on first call.
    pub async fn check(&self) -> Availability {
        *self.result.get_or_init(|| self.probe()).await
    }

    async fn probe(&self) -> Availability {
        self.checking.store(true, Ordering::SeqCst);
        let _guard = CheckingGuard(&self.checking);

        let outcome = AssertUnwindSafe(self.host.availability())
            .catch_unwind()
            .await;

        let availability = match outcome {
            Ok(Ok(availability)) => availability,
            Ok(Err(e)) => {
                warn!(host = self.host.name(), error = %e, "Availability probe failed");
                Availability::Unavailable
            }
            Err(_) => {
                warn!(host = self.host.name(), "Availability probe panicked");
                Availability::Unavailable
            }
        };

        info!(host = self.host.name(), availability = %availability, "Model availability");
        availability
    }

    /// Cached result, if the probe has completed.
    pub fn cached(&self) -> Option<Availability> {
        self.result.get().copied()
    }

    /// Whether the model is usable. False until the probe completes.
    pub fn is_available(&self) -> bool {
        self.cached().is_some_and(|a| a.is_usable())
    }

    /// Whether a probe is currently in flight.
    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::SeqCst)
    }
}
