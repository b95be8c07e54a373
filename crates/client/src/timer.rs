//! Cancellable debounce timer.
//!
//! Models the "mutable timeout handle" idiom as an arm-or-reset scheduled
//! task: each `arm` supersedes any pending one, the callback fires exactly
//! once after the delay elapses without another arm, and `cancel` (or drop)
//! suppresses a pending fire entirely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::runtime;

#[derive(Default)]
pub struct DebounceTimer {
    generation: Arc<AtomicU64>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback` to run after `delay`, superseding any pending arm.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn arm(&self, delay: Duration, callback: impl FnOnce() + Send + 'static) {
        let armed = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        runtime::spawn(async move {
            runtime::sleep(delay).await;
            // A later arm or a cancel moved the generation on; stay quiet.
            if generation.load(Ordering::SeqCst) == armed {
                callback();
            }
        });
    }

    #[cfg(target_arch = "wasm32")]
    pub fn arm(&self, delay: Duration, callback: impl FnOnce() + 'static) {
        let armed = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        runtime::spawn(async move {
            runtime::sleep(delay).await;
            if generation.load(Ordering::SeqCst) == armed {
                callback();
            }
        });
    }

    /// Suppress a pending fire, if any.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
