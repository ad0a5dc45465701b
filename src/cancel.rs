use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Shared interruption flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag that is raised on Ctrl-C.
    pub fn install_handler() -> Result<Self, ctrlc::Error> {
        let cancel = Self::new();
        let flag = cancel.clone();
        ctrlc::set_handler(move || {
            if !flag.is_cancelled() {
                warn!("Interrupted, finishing records in flight");
            }
            flag.cancel();
        })?;
        Ok(cancel)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
