use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Storage, Window};

/// Retrieve the global `window` object, if running in a browser.
#[must_use]
pub fn window() -> Option<Window> {
    web_sys::window()
}

/// Access the browser `localStorage` handle.
///
/// # Errors
/// Returns an error if there is no window or `localStorage` is unavailable
/// (for example when storage is disabled by privacy settings).
pub fn local_storage() -> Result<Storage, JsValue> {
    window()
        .ok_or_else(|| JsValue::from_str("window unavailable"))?
        .local_storage()?
        .ok_or_else(|| JsValue::from_str("localStorage unavailable"))
}

/// Convert a JavaScript value into a readable string for error reporting.
#[must_use]
pub fn js_error_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|err| err.message().into())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

/// The `name` property of a thrown value (`"QuotaExceededError"`, ...).
#[must_use]
pub fn js_error_name(value: &JsValue) -> Option<String> {
    js_sys::Reflect::get(value, &JsValue::from_str("name"))
        .ok()
        .and_then(|name| name.as_string())
}

/// Log a warning to the browser console.
pub fn console_warn(message: &str) {
    web_sys::console::warn_1(&JsValue::from(message));
}
