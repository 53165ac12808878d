//! Order-preserving recorder for hook firings.

use std::cell::RefCell;
use std::rc::Rc;

/// Shared append-only event log. Clones share the same buffer, so a test
/// can hand one clone to each native closure and read everything back.
#[derive(Clone, Default)]
pub struct HookLog {
    events: Rc<RefCell<Vec<String>>>,
}

impl HookLog {
    pub fn new() -> HookLog {
        HookLog::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn count_matching(&self, prefix: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}
