use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Error;
use crate::Result;

/// Key/value storage for macaroon records. Keys and values are opaque
/// strings. Implementations must be safe for concurrent use.
pub trait Storage: Send + Sync {
    /// Stores `item` under `key`, overwriting any previous item.
    fn put(&self, key: &str, item: &str) -> Result<()>;

    /// Retrieves the item under `key`, or [`Error::NotFound`].
    fn get(&self, key: &str) -> Result<String>;

    /// Deletes the item under `key`, or [`Error::NotFound`].
    fn del(&self, key: &str) -> Result<()>;
}

/// In-memory [`Storage`] backed by a synchronized map.
#[derive(Debug, Default)]
pub struct MemStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemStorage {
    pub fn new() -> MemStorage {
        MemStorage::default()
    }
}

impl Storage for MemStorage {
    fn put(&self, key: &str, item: &str) -> Result<()> {
        let mut items = self.items.lock().expect("storage lock poisoned");
        items.insert(String::from(key), String::from(item));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String> {
        let items = self.items.lock().expect("storage lock poisoned");
        items.get(key).cloned().ok_or(Error::NotFound)
    }

    fn del(&self, key: &str) -> Result<()> {
        let mut items = self.items.lock().expect("storage lock poisoned");
        items.remove(key).map(|_| ()).ok_or(Error::NotFound)
    }
}
