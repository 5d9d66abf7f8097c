//! Fault observer fan-out.
//!
//! The bus keeps one composite observer; transports and the execution engine
//! raise every fault through it so monitoring sees anything that is not
//! surfaced as a synchronous error return.

use std::sync::Arc;

use relay_core::{Fault, FaultObserver};
use tracing::warn;

/// Composite observer that fans out to multiple observers.
///
/// Notification order across observers is unspecified; each fault is also
/// logged at warn level so faults remain observable with zero registered
/// observers.
#[derive(Default)]
pub struct CompositeFaultObserver {
    observers: Vec<Arc<dyn FaultObserver>>,
}

impl CompositeFaultObserver {
    /// Creates a composite observer with the given list of observers.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn FaultObserver>>) -> Self {
        Self { observers }
    }

    /// Adds an observer after construction.
    pub fn add(&mut self, observer: Arc<dyn FaultObserver>) {
        self.observers.push(observer);
    }
}

impl FaultObserver for CompositeFaultObserver {
    fn on_fault(&self, fault: &Fault) {
        warn!(source = ?fault.source, context = %fault.context, "{}", fault.detail);
        for observer in &self.observers {
            observer.on_fault(fault);
        }
    }
}
