use std::cell::RefCell;

thread_local! {
    /// Names of the internal events emitted by the current test thread, in order.
    static EVENTS_RECORDED: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn record_internal_event(name: &'static str) {
    EVENTS_RECORDED.with(|events| events.borrow_mut().push(name));
}

pub(crate) fn clear_recorded_events() {
    EVENTS_RECORDED.with(|events| events.borrow_mut().clear());
}

/// Returns how many times an event called `name` was emitted on this thread.
pub(crate) fn count(name: &str) -> usize {
    EVENTS_RECORDED.with(|events| events.borrow().iter().filter(|event| **event == name).count())
}

/// Returns `Ok(())` if `name` was emitted exactly once.
pub(crate) fn contains_name_once(name: &str) -> Result<(), String> {
    match count(name) {
        1 => Ok(()),
        0 => Err(format!("Missing event `{name}`")),
        n => Err(format!("Multiple ({n}) events named `{name}`")),
    }
}
