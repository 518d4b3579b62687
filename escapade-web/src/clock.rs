use escapade_core::{Clock, Millis};

/// Wall clock backed by `Date.now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsClock;

impl Clock for JsClock {
    #[allow(clippy::cast_possible_truncation)] // Date.now() is integral milliseconds
    fn now_ms(&self) -> Millis {
        js_sys::Date::now() as Millis
    }
}
