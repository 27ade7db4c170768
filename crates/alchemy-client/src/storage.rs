use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable")]
    Unavailable,
    #[error("storage write failed: {0}")]
    Write(String),
}

/// Durable string key-value storage, shaped like browser `localStorage`.
pub trait PersistentStorage {
    fn get_item(&self, key: &str) -> Option<String>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str);
}

/// In-memory storage. Clones share the same map, so a clone handed to a new
/// store behaves like the same browser profile after a reload.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl PersistentStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        self.items.borrow_mut().remove(key);
    }
}

/// Calls the closure with browser localStorage, if available. Returns `None`
/// on non-WASM targets or when storage is blocked.
#[allow(unused_variables)]
pub fn with_local_storage<T>(f: impl FnOnce(&web_sys::Storage) -> T) -> Option<T> {
    #[cfg(target_family = "wasm")]
    {
        if let Some(window) = web_sys::window()
            && let Ok(Some(storage)) = window.local_storage()
        {
            return Some(f(&storage));
        }
    }
    None
}

/// Browser `localStorage`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserStorage;

impl PersistentStorage for BrowserStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        with_local_storage(|s| s.get_item(key).ok().flatten()).flatten()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        match with_local_storage(|s| s.set_item(key, value)) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(StorageError::Write(format!("{e:?}"))),
            None => Err(StorageError::Unavailable),
        }
    }

    fn remove_item(&self, key: &str) {
        with_local_storage(|s| {
            let _ = s.remove_item(key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_round_trips() {
        let storage = MemoryStorage::new();
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").as_deref(), Some("v"));
        storage.remove_item("k");
        assert!(storage.get_item("k").is_none());
    }

    #[test]
    fn clones_share_contents() {
        let storage = MemoryStorage::new();
        let reloaded = storage.clone();
        storage.set_item("gameStarted", "true").unwrap();
        assert_eq!(reloaded.get_item("gameStarted").as_deref(), Some("true"));
    }

    #[test]
    fn browser_storage_is_unavailable_natively() {
        assert!(BrowserStorage.get_item("k").is_none());
        assert!(matches!(
            BrowserStorage.set_item("k", "v"),
            Err(StorageError::Unavailable)
        ));
    }
}
