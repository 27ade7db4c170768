use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use alchemy_core::time::days_to_millis;
use alchemy_core::{Element, Identity, PlacedElement, PlacementKey, Position};

use crate::diag;
use crate::storage::{PersistentStorage, StorageError};

pub const AVAILABLE_ELEMENTS_KEY: &str = "availableElements";
pub const CANVAS_ELEMENTS_KEY: &str = "canvasElements";
pub const GAME_STARTED_KEY: &str = "gameStarted";

/// How long the started flag survives without a new game.
pub const GAME_STARTED_TTL_MS: u64 = days_to_millis(30);

/// Catalog entry as persisted. Artwork is left out and fetched back from the
/// server cache after a reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredElement {
    pub id: Identity,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub position: Position,
}

/// Canvas entry as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlacement {
    pub key: PlacementKey,
    pub id: Identity,
    pub name: String,
    pub description: String,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartedFlag {
    value: bool,
    expires_at: u64,
}

impl From<&Element> for StoredElement {
    fn from(e: &Element) -> Self {
        Self {
            id: e.id.clone(),
            name: e.name.clone(),
            description: e.description.clone(),
            position: Position::ORIGIN,
        }
    }
}

impl From<StoredElement> for Element {
    fn from(s: StoredElement) -> Self {
        Self {
            id: s.id,
            name: s.name,
            description: s.description,
            image: None,
        }
    }
}

impl From<&PlacedElement> for StoredPlacement {
    fn from(p: &PlacedElement) -> Self {
        Self {
            key: p.key.clone(),
            id: p.element.id.clone(),
            name: p.element.name.clone(),
            description: p.element.description.clone(),
            position: p.position,
        }
    }
}

impl From<StoredPlacement> for PlacedElement {
    fn from(s: StoredPlacement) -> Self {
        Self {
            key: s.key,
            element: Element {
                id: s.id,
                name: s.name,
                description: s.description,
                image: None,
            },
            position: s.position,
        }
    }
}

fn save<T: Serialize>(
    storage: &impl PersistentStorage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).map_err(|e| StorageError::Write(e.to_string()))?;
    storage.set_item(key, &json)
}

/// Read `key`, treating a missing or unreadable value as absent.
fn load<T: DeserializeOwned>(storage: &impl PersistentStorage, key: &str) -> Option<T> {
    let raw = storage.get_item(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            diag::console_warn!("Discarding unreadable {key} from storage: {e}");
            None
        },
    }
}

pub fn save_available<'a>(
    storage: &impl PersistentStorage,
    elements: impl IntoIterator<Item = &'a Element>,
) -> Result<(), StorageError> {
    let stored: Vec<StoredElement> = elements.into_iter().map(StoredElement::from).collect();
    save(storage, AVAILABLE_ELEMENTS_KEY, &stored)
}

pub fn load_available(storage: &impl PersistentStorage) -> Vec<Element> {
    load::<Vec<StoredElement>>(storage, AVAILABLE_ELEMENTS_KEY)
        .unwrap_or_default()
        .into_iter()
        .map(Element::from)
        .collect()
}

pub fn save_canvas(
    storage: &impl PersistentStorage,
    canvas: &[PlacedElement],
) -> Result<(), StorageError> {
    let stored: Vec<StoredPlacement> = canvas.iter().map(StoredPlacement::from).collect();
    save(storage, CANVAS_ELEMENTS_KEY, &stored)
}

pub fn load_canvas(storage: &impl PersistentStorage) -> Vec<PlacedElement> {
    load::<Vec<StoredPlacement>>(storage, CANVAS_ELEMENTS_KEY)
        .unwrap_or_default()
        .into_iter()
        .map(PlacedElement::from)
        .collect()
}

pub fn mark_started(storage: &impl PersistentStorage, now_ms: u64) -> Result<(), StorageError> {
    let flag = StartedFlag {
        value: true,
        expires_at: now_ms.saturating_add(GAME_STARTED_TTL_MS),
    };
    save(storage, GAME_STARTED_KEY, &flag)
}

/// Whether a game was started and the flag has not expired. An expired flag
/// is removed.
pub fn is_started(storage: &impl PersistentStorage, now_ms: u64) -> bool {
    match load::<StartedFlag>(storage, GAME_STARTED_KEY) {
        Some(flag) if now_ms < flag.expires_at => flag.value,
        Some(_) => {
            storage.remove_item(GAME_STARTED_KEY);
            false
        },
        None => false,
    }
}

pub fn clear_all(storage: &impl PersistentStorage) {
    storage.remove_item(AVAILABLE_ELEMENTS_KEY);
    storage.remove_item(CANVAS_ELEMENTS_KEY);
    storage.remove_item(GAME_STARTED_KEY);
}
