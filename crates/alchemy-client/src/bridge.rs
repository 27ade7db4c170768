//! JavaScript surface of the client. The page drives a `GameSession` and
//! redraws from `stateJson()` after every call.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use alchemy_core::{Identity, PlacementKey, Position};

use crate::catalog::{CatalogStore, StartPlan, StartReport};
use crate::diag;
use crate::service::{ElementService, HttpElementService, fetch_missing_artifacts, seed_elements};
use crate::storage::BrowserStorage;

type SharedStore = Rc<RefCell<CatalogStore<BrowserStorage>>>;

#[wasm_bindgen]
pub struct GameSession {
    store: SharedStore,
    service: Rc<HttpElementService>,
}

fn page_origin() -> Option<String> {
    web_sys::window()?.location().origin().ok()
}

fn report_json(report: &StartReport) -> String {
    serde_json::json!({
        "restored": report.restored,
        "seeded": report.seeded,
        "added": report.added,
        "failures": report.failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
    .to_string()
}

#[wasm_bindgen]
impl GameSession {
    /// `base_url` defaults to the page origin.
    #[wasm_bindgen(constructor)]
    pub fn new(base_url: Option<String>) -> GameSession {
        let base_url = base_url.or_else(page_origin).unwrap_or_default();
        GameSession {
            store: Rc::new(RefCell::new(CatalogStore::new(BrowserStorage))),
            service: Rc::new(HttpElementService::new(base_url)),
        }
    }

    /// Resolves to a JSON start report. The store is never borrowed across
    /// an await, so the page may keep mutating it while seeding runs.
    #[wasm_bindgen(js_name = startGame)]
    pub fn start_game(&self) -> js_sys::Promise {
        let store = Rc::clone(&self.store);
        let service = Rc::clone(&self.service);
        future_to_promise(async move {
            let plan = store.borrow().plan_start();
            let report = match plan {
                StartPlan::Restore => {
                    let ids = store.borrow_mut().begin_restore();
                    let fetched = fetch_missing_artifacts(service.as_ref(), &ids).await;
                    store.borrow_mut().finish_restore(fetched)
                },
                StartPlan::Seed { count } => {
                    let results = seed_elements(service.as_ref(), count).await;
                    store.borrow_mut().apply_seed(results)
                },
            };
            Ok(JsValue::from_str(&report_json(&report)))
        })
    }

    /// Combine two placements. Resolves to the new placement key.
    pub fn combine(&self, first: String, second: String) -> js_sys::Promise {
        let store = Rc::clone(&self.store);
        let service = Rc::clone(&self.service);
        future_to_promise(async move {
            let first = PlacementKey::from(first.as_str());
            let second = PlacementKey::from(second.as_str());
            let (prompt, midpoint) = store
                .borrow()
                .combination_request(&first, &second)
                .map_err(|e| JsValue::from_str(&e.to_string()))?;

            let result = service
                .combine_elements(&prompt)
                .await
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            let key = store
                .borrow_mut()
                .apply_combination(&first, &second, result, midpoint);
            Ok(JsValue::from_str(key.as_str()))
        })
    }

    #[wasm_bindgen(js_name = stateJson)]
    pub fn state_json(&self) -> String {
        match serde_json::to_string(&self.store.borrow().snapshot()) {
            Ok(json) => json,
            Err(e) => {
                diag::console_warn!("Failed to serialize state: {e}");
                "{}".to_string()
            },
        }
    }

    /// Place a catalog element. Returns the placement key, or `undefined`
    /// for an unknown identity.
    #[wasm_bindgen(js_name = placeElement)]
    pub fn place_element(&self, id: String, x: f64, y: f64) -> Option<String> {
        self.store
            .borrow_mut()
            .place_from_catalog(&Identity::from(id), Position::new(x, y))
            .map(|key| key.as_str().to_string())
    }

    #[wasm_bindgen(js_name = moveElement)]
    pub fn move_element(&self, key: String, x: f64, y: f64) {
        self.store
            .borrow_mut()
            .update_element_position(&PlacementKey::from(key.as_str()), Position::new(x, y));
    }

    #[wasm_bindgen(js_name = removeElement)]
    pub fn remove_element(&self, key: String) -> bool {
        self.store
            .borrow_mut()
            .remove_canvas_element(&PlacementKey::from(key.as_str()))
    }

    #[wasm_bindgen(js_name = clearCanvas)]
    pub fn clear_canvas(&self) {
        self.store.borrow_mut().clear_canvas();
    }

    #[wasm_bindgen(js_name = resetGame)]
    pub fn reset_game(&self) {
        self.store.borrow_mut().reset_game();
    }
}
