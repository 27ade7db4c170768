pub mod catalog;
mod diag;
pub mod persist;
pub mod service;
pub mod storage;

#[cfg(target_family = "wasm")]
mod bridge;

pub use catalog::{CatalogError, CatalogStore, StartPlan, StartReport};
pub use service::{ElementService, HttpElementService, ServiceError};
pub use storage::{BrowserStorage, MemoryStorage, PersistentStorage, StorageError};

use wasm_bindgen::prelude::*;

/// WASM entry point.
#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(target_family = "wasm")]
    console_error_panic_hook::set_once();
}
