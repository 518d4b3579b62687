use escapade_core::{IntervalHandle, Scheduler};
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;

use crate::dom;

/// [`Scheduler`] backed by `window.setInterval`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalScheduler;

/// A live `setInterval` registration. The closure is owned here so it stays
/// alive exactly as long as the interval does.
pub struct BrowserInterval {
    id: Option<i32>,
    closure: Option<Closure<dyn FnMut()>>,
}

impl std::fmt::Debug for BrowserInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserInterval")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl BrowserInterval {
    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        self.id.is_some()
    }
}

impl Scheduler for IntervalScheduler {
    type Handle = BrowserInterval;

    fn every(&self, period_ms: u32, tick: Box<dyn FnMut()>) -> Self::Handle {
        let closure = Closure::wrap(tick);
        let timeout = i32::try_from(period_ms.max(1)).unwrap_or(i32::MAX);
        let id = dom::window().and_then(|window| {
            window
                .set_interval_with_callback_and_timeout_and_arguments_0(
                    closure.as_ref().unchecked_ref(),
                    timeout,
                )
                .map_err(|err| {
                    dom::console_warn(&format!(
                        "setInterval failed: {}",
                        dom::js_error_message(&err)
                    ));
                })
                .ok()
        });
        BrowserInterval {
            id,
            closure: id.map(|_| closure),
        }
    }
}

impl IntervalHandle for BrowserInterval {
    fn cancel(&mut self) {
        if let Some(id) = self.id.take()
            && let Some(window) = dom::window()
        {
            window.clear_interval_with_handle(id);
        }
        self.closure.take();
    }
}

impl Drop for BrowserInterval {
    fn drop(&mut self) {
        self.cancel();
    }
}
