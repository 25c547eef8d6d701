#[cfg(test)]
pub(crate) mod event_test_util;
pub mod prelude;

pub trait InternalEvent: Sized {
    fn emit(self);

    /// Name recorded by tests that assert which events fired.
    fn name(&self) -> Option<&'static str> {
        None
    }
}

#[cfg(test)]
pub fn emit(event: impl InternalEvent) {
    if let Some(name) = event.name() {
        event_test_util::record_internal_event(name);
    }
    event.emit();
}

#[cfg(not(test))]
pub fn emit(event: impl InternalEvent) {
    event.emit();
}

#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::internal_events::emit($event)
    };
}

// Modules that require emit! macro so they need to be defined after the macro.
mod netflow;

pub use self::netflow::*;
