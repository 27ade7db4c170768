//! Player session state: the discovered-element catalog and the canvas.
//!
//! Every mutator writes the affected collection back to storage before it
//! returns, so storage always mirrors what is in memory. Artwork is the one
//! exception; it is never persisted and is fetched back from the server cache
//! after a restore.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use alchemy_core::api::CacheEntry;
use alchemy_core::time::now_millis;
use alchemy_core::{Element, Identity, PlacedElement, PlacementKey, Position};

use crate::diag;
use crate::persist;
use crate::service::{ElementService, ServiceError, fetch_missing_artifacts, seed_elements};
use crate::storage::PersistentStorage;

/// Random elements requested when a fresh game starts.
pub const SEED_COUNT: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("no placement {0} on the canvas")]
    UnknownPlacement(PlacementKey),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// What `start_game` will do for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPlan {
    /// A game is already running: reload saved state and skip generation.
    Restore,
    /// Fresh session: generate `count` elements.
    Seed { count: usize },
}

/// Outcome of starting a game.
#[derive(Debug, Default)]
pub struct StartReport {
    pub restored: bool,
    /// Seed requests that returned an element.
    pub seeded: usize,
    /// Elements that were new to the catalog.
    pub added: usize,
    /// Failures worth telling the player about. None of them abort the start.
    pub failures: Vec<ServiceError>,
}

/// JSON view of the session handed to the UI.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot<'a> {
    pub game_started: bool,
    pub available_elements: Vec<&'a Element>,
    pub canvas_elements: &'a [PlacedElement],
}

pub struct CatalogStore<S: PersistentStorage> {
    storage: S,
    available: HashMap<Identity, Element>,
    canvas: Vec<PlacedElement>,
    next_sequence: u64,
    clock: fn() -> u64,
}

impl<S: PersistentStorage> CatalogStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_clock(storage, now_millis)
    }

    /// Store reading time from `clock` (milliseconds since the epoch).
    pub fn with_clock(storage: S, clock: fn() -> u64) -> Self {
        Self {
            storage,
            available: HashMap::new(),
            canvas: Vec::new(),
            next_sequence: 0,
            clock,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn is_game_started(&self) -> bool {
        persist::is_started(&self.storage, (self.clock)())
    }

    // --- Starting a game ---

    pub fn plan_start(&self) -> StartPlan {
        if self.is_game_started() {
            StartPlan::Restore
        } else {
            StartPlan::Seed { count: SEED_COUNT }
        }
    }

    /// Merge saved catalog and canvas into memory. Entries already in memory
    /// win over saved ones.
    pub fn restore(&mut self) {
        for element in persist::load_available(&self.storage) {
            self.available.entry(element.id.clone()).or_insert(element);
        }

        let present: HashSet<PlacementKey> = self.canvas.iter().map(|p| p.key.clone()).collect();
        for placed in persist::load_canvas(&self.storage) {
            if !present.contains(&placed.key) {
                self.canvas.push(placed);
            }
        }

        let max_seen = self.canvas.iter().filter_map(|p| p.key.sequence()).max();
        if let Some(max) = max_seen {
            self.next_sequence = self.next_sequence.max(max + 1);
        }

        self.persist_available();
        self.persist_canvas();
    }

    /// Fold seed results into the catalog. The game counts as started once
    /// at least one seed came back.
    pub fn apply_seed(&mut self, results: Vec<Result<Element, ServiceError>>) -> StartReport {
        let mut report = StartReport::default();
        for result in results {
            match result {
                Ok(element) => {
                    report.seeded += 1;
                    if self.add_available_element(element) {
                        report.added += 1;
                    }
                },
                Err(e) => {
                    diag::console_warn!("Seed element failed: {e}");
                    report.failures.push(e);
                },
            }
        }

        if report.seeded > 0
            && let Err(e) = persist::mark_started(&self.storage, (self.clock)())
        {
            diag::console_warn!("Failed to save game state: {e}");
        }
        report
    }

    /// Restore saved state. Returns the identities whose artwork must be
    /// fetched before [`finish_restore`](Self::finish_restore).
    pub fn begin_restore(&mut self) -> Vec<Identity> {
        self.restore();
        self.missing_artifact_ids()
    }

    /// Attach the artwork fetched after [`begin_restore`](Self::begin_restore).
    /// A failed fetch is reported; the restored elements stay without artwork.
    pub fn finish_restore(&mut self, fetched: Result<Vec<CacheEntry>, ServiceError>) -> StartReport {
        let mut report = StartReport {
            restored: true,
            ..StartReport::default()
        };
        match fetched {
            Ok(entries) => {
                self.apply_artifacts(entries);
            },
            Err(e) => {
                diag::console_warn!("Failed to fetch artwork: {e}");
                report.failures.push(e);
            },
        }
        report
    }

    pub async fn start_game<E: ElementService>(&mut self, service: &E) -> StartReport {
        match self.plan_start() {
            StartPlan::Restore => {
                let ids = self.begin_restore();
                let fetched = fetch_missing_artifacts(service, &ids).await;
                self.finish_restore(fetched)
            },
            StartPlan::Seed { count } => {
                let results = seed_elements(service, count).await;
                self.apply_seed(results)
            },
        }
    }

    // --- Artwork ---

    /// Identities in the catalog or on the canvas that have no artwork yet.
    pub fn missing_artifact_ids(&self) -> Vec<Identity> {
        let mut ids: Vec<Identity> = self
            .available
            .values()
            .filter(|e| !e.has_image())
            .map(|e| e.id.clone())
            .chain(
                self.canvas
                    .iter()
                    .filter(|p| !p.element.has_image())
                    .map(|p| p.element.id.clone()),
            )
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        ids
    }

    /// Attach fetched artwork. Returns how many identities received some.
    pub fn apply_artifacts(&mut self, entries: Vec<CacheEntry>) -> usize {
        let mut applied = 0;
        for CacheEntry { id, artifact } in entries {
            let Some(artifact) = artifact else {
                diag::console_log!("No cached artwork for {id}");
                continue;
            };
            if let Some(element) = self.available.get_mut(&id) {
                element.image = Some(artifact.clone());
            }
            for placed in self.canvas.iter_mut().filter(|p| p.element.id == id) {
                placed.element.image = Some(artifact.clone());
            }
            applied += 1;
        }
        applied
    }

    pub async fn rehydrate_artifacts<E: ElementService>(
        &mut self,
        service: &E,
    ) -> Result<usize, ServiceError> {
        let ids = self.missing_artifact_ids();
        let entries = fetch_missing_artifacts(service, &ids).await.inspect_err(|e| {
            diag::console_warn!("Failed to fetch artwork: {e}");
        })?;
        Ok(self.apply_artifacts(entries))
    }

    // --- Catalog and canvas ---

    /// Add `element` to the catalog unless its identity is already known.
    /// The first element seen for an identity keeps its name and description;
    /// a later copy only lends its artwork if the first had none.
    pub fn add_available_element(&mut self, element: Element) -> bool {
        if let Some(existing) = self.available.get_mut(&element.id) {
            if existing.image.is_none() {
                existing.image = element.image;
            }
            return false;
        }
        self.available.insert(element.id.clone(), element);
        self.persist_available();
        true
    }

    pub fn add_canvas_element(&mut self, element: Element, position: Position) -> PlacementKey {
        let key = PlacementKey::new(&element.id, self.next_sequence);
        self.next_sequence += 1;
        self.canvas.push(PlacedElement {
            key: key.clone(),
            element,
            position,
        });
        self.persist_canvas();
        key
    }

    /// Drop a copy of a catalog element onto the canvas.
    pub fn place_from_catalog(&mut self, id: &Identity, position: Position) -> Option<PlacementKey> {
        let element = self.available.get(id)?.clone();
        Some(self.add_canvas_element(element, position))
    }

    /// Move a placement. Unknown keys are ignored.
    pub fn update_element_position(&mut self, key: &PlacementKey, position: Position) {
        if let Some(placed) = self.canvas.iter_mut().find(|p| &p.key == key) {
            placed.position = position;
            self.persist_canvas();
        }
    }

    pub fn remove_canvas_element(&mut self, key: &PlacementKey) -> bool {
        let before = self.canvas.len();
        self.canvas.retain(|p| &p.key != key);
        let removed = self.canvas.len() != before;
        self.persist_canvas();
        removed
    }

    pub fn clear_canvas(&mut self) {
        self.canvas.clear();
        self.persist_canvas();
    }

    /// Forget the whole session, including the started flag.
    pub fn reset_game(&mut self) {
        self.available.clear();
        self.canvas.clear();
        self.next_sequence = 0;
        persist::clear_all(&self.storage);
    }

    // --- Combining ---

    /// Combine two placements into a new element placed at their midpoint.
    /// The canvas is left alone if the request fails.
    pub async fn combine<E: ElementService>(
        &mut self,
        service: &E,
        first: &PlacementKey,
        second: &PlacementKey,
    ) -> Result<PlacementKey, CatalogError> {
        let (prompt, midpoint) = self.combination_request(first, second)?;
        let result = service.combine_elements(&prompt).await?;
        Ok(self.apply_combination(first, second, result, midpoint))
    }

    /// Prompt and landing position for combining two placements.
    pub fn combination_request(
        &self,
        first: &PlacementKey,
        second: &PlacementKey,
    ) -> Result<(String, Position), CatalogError> {
        let a = self.placement(first)?;
        let b = self.placement(second)?;
        Ok((
            combination_prompt(&a.element, &b.element),
            a.position.midpoint(b.position),
        ))
    }

    /// Replace two placements with `result` at `position`.
    pub fn apply_combination(
        &mut self,
        first: &PlacementKey,
        second: &PlacementKey,
        result: Element,
        position: Position,
    ) -> PlacementKey {
        self.canvas.retain(|p| &p.key != first && &p.key != second);
        self.add_available_element(result.clone());
        // The catalog copy may carry artwork the response lacked
        let placed = match self.available.get(&result.id) {
            Some(known) if !result.has_image() && known.has_image() => known.clone(),
            _ => result,
        };
        self.add_canvas_element(placed, position)
    }

    fn placement(&self, key: &PlacementKey) -> Result<&PlacedElement, CatalogError> {
        self.canvas
            .iter()
            .find(|p| &p.key == key)
            .ok_or_else(|| CatalogError::UnknownPlacement(key.clone()))
    }

    // --- Views ---

    /// Catalog sorted alphabetically by name, ignoring case and accents.
    pub fn available_elements(&self) -> Vec<&Element> {
        let mut elements: Vec<&Element> = self.available.values().collect();
        elements.sort_by(|a, b| compare_names(a, b));
        elements
    }

    pub fn canvas_elements(&self) -> &[PlacedElement] {
        &self.canvas
    }

    pub fn snapshot(&self) -> CatalogSnapshot<'_> {
        CatalogSnapshot {
            game_started: self.is_game_started(),
            available_elements: self.available_elements(),
            canvas_elements: &self.canvas,
        }
    }

    fn persist_available(&self) {
        if let Err(e) = persist::save_available(&self.storage, self.available.values()) {
            diag::console_warn!("Failed to save elements: {e}");
        }
    }

    fn persist_canvas(&self) {
        if let Err(e) = persist::save_canvas(&self.storage, &self.canvas) {
            diag::console_warn!("Failed to save canvas: {e}");
        }
    }
}

/// Prompt sent to the server when two elements are combined.
pub fn combination_prompt(a: &Element, b: &Element) -> String {
    format!("{} + {}", a.name, b.name)
}

fn compare_names(a: &Element, b: &Element) -> Ordering {
    collate(&a.name, &b.name)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.as_str().cmp(b.id.as_str()))
}

/// Primary ordering in the browser's locale.
#[cfg(target_family = "wasm")]
fn collate(a: &str, b: &str) -> Ordering {
    js_sys::JsString::from(a)
        .locale_compare(b, &js_sys::Array::new(), &js_sys::Object::new())
        .cmp(&0)
}

/// Primary ordering ignoring case and accents.
#[cfg(not(target_family = "wasm"))]
fn collate(a: &str, b: &str) -> Ordering {
    fold(a).cmp(&fold(b))
}

#[cfg(not(target_family = "wasm"))]
fn fold(name: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    use unicode_normalization::char::is_combining_mark;

    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}
