#![forbid(unsafe_code)]
//! Browser bindings for the Escapade core.
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod client;
pub mod clock;
pub mod dom;
pub mod schedule;
pub mod storage;

pub use client::EscapeClient;
pub use clock::JsClock;
pub use schedule::{BrowserInterval, IntervalScheduler};
pub use storage::LocalStorageStore;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    log::debug!("escapade-web loaded");
}
