use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        let mut rgba = Vec::with_capacity(pixel_count * 4);
        for _ in 0..pixel_count {
            rgba.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            rgba,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Texture(TextureData),
    Text(String),
    Bytes(Vec<u8>),
}

impl Asset {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Asset::Texture(_) => "texture",
            Asset::Text(_) => "text",
            Asset::Bytes(_) => "bytes",
        }
    }

    pub fn as_texture(&self) -> Option<&TextureData> {
        match self {
            Asset::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Asset::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AssetStoreError {
    #[error("no asset exists for key {key}")]
    NotFound { key: String },
    #[error("invalid asset key {key}: {reason}")]
    InvalidKey { key: String, reason: String },
    #[error("failed to read asset {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode asset {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// Backing storage the cache loads from. Implementations own decoding.
pub trait AssetStore {
    fn load(&mut self, key: &str) -> Result<Asset, AssetStoreError>;

    fn unload(&mut self, _key: &str, _asset: Asset) {}
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not load {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: AssetStoreError,
    },
    #[error("asset {key} is {actual}, expected {expected}")]
    WrongKind {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl LoadError {
    pub fn key(&self) -> &str {
        match self {
            LoadError::Store { key, .. } | LoadError::WrongKind { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    slot: u32,
    generation: u32,
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.slot, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("resource handle {handle} is stale")]
pub struct StaleHandleError {
    pub handle: ResourceHandle,
}

/// Logs a stale handle use. Debug builds treat it as a bug.
pub(crate) fn report_stale_handle(error: &StaleHandleError, operation: &'static str) {
    error!(handle = %error.handle, operation, "stale_resource_handle");
    debug_assert!(false, "{operation}: {error}");
}

#[derive(Debug)]
struct CacheEntry {
    key: String,
    asset: Asset,
    refcount: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<CacheEntry>,
}

/// Reference-counted asset cache keyed by string path.
///
/// Every successful `acquire` must be paired with one `release`. The entry is handed back to
/// the store when the last holder releases it, and the slot generation moves on so old
/// handles fail instead of aliasing whatever reuses the slot.
pub struct ResourceManager {
    store: Box<dyn AssetStore>,
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    by_key: HashMap<String, ResourceHandle>,
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("cached", &self.by_key.len())
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl ResourceManager {
    pub fn new(store: Box<dyn AssetStore>) -> Self {
        Self {
            store,
            slots: Vec::new(),
            free_slots: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    pub fn acquire(&mut self, key: &str) -> Result<ResourceHandle, LoadError> {
        if let Some(&handle) = self.by_key.get(key) {
            if let Some(entry) = self.entry_mut(handle) {
                entry.refcount = entry.refcount.saturating_add(1);
                debug!(key, refcount = entry.refcount, "resource_shared");
                return Ok(handle);
            }
            self.by_key.remove(key);
        }

        let asset = self.store.load(key).map_err(|source| LoadError::Store {
            key: key.to_string(),
            source,
        })?;
        debug!(key, kind = asset.kind_name(), "resource_loaded");
        Ok(self.insert(key, asset))
    }

    pub fn acquire_texture(&mut self, key: &str) -> Result<ResourceHandle, LoadError> {
        self.acquire_kind(key, "texture")
    }

    pub fn acquire_text(&mut self, key: &str) -> Result<ResourceHandle, LoadError> {
        self.acquire_kind(key, "text")
    }

    fn acquire_kind(
        &mut self,
        key: &str,
        expected: &'static str,
    ) -> Result<ResourceHandle, LoadError> {
        let handle = self.acquire(key)?;
        let actual = self
            .entry(handle)
            .map(|entry| entry.asset.kind_name())
            .unwrap_or(expected);
        if actual == expected {
            return Ok(handle);
        }
        if let Err(error) = self.release(handle) {
            report_stale_handle(&error, "acquire_kind");
        }
        Err(LoadError::WrongKind {
            key: key.to_string(),
            expected,
            actual,
        })
    }

    /// Loads a text asset, copies it out and drops the cache reference again.
    pub fn read_text(&mut self, key: &str) -> Result<String, LoadError> {
        let handle = self.acquire_text(key)?;
        let text = self
            .get(handle)
            .ok()
            .and_then(Asset::as_text)
            .map(ToString::to_string)
            .unwrap_or_default();
        if let Err(error) = self.release(handle) {
            report_stale_handle(&error, "read_text");
        }
        Ok(text)
    }

    pub fn get(&self, handle: ResourceHandle) -> Result<&Asset, StaleHandleError> {
        self.entry(handle)
            .map(|entry| &entry.asset)
            .ok_or(StaleHandleError { handle })
    }

    /// Drops one reference. Returns the remaining count; zero means the entry was evicted.
    pub fn release(&mut self, handle: ResourceHandle) -> Result<u32, StaleHandleError> {
        let remaining = {
            let entry = self.entry_mut(handle).ok_or(StaleHandleError { handle })?;
            entry.refcount = entry.refcount.saturating_sub(1);
            entry.refcount
        };
        if remaining == 0 {
            self.evict(handle);
        }
        Ok(remaining)
    }

    pub fn refcount(&self, key: &str) -> u32 {
        self.by_key
            .get(key)
            .and_then(|handle| self.entry(*handle))
            .map(|entry| entry.refcount)
            .unwrap_or(0)
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn cached_count(&self) -> usize {
        self.by_key.len()
    }

    /// Evicts everything regardless of outstanding references.
    pub fn clear(&mut self) -> usize {
        let handles: Vec<ResourceHandle> = self.by_key.values().copied().collect();
        let leaked = handles
            .iter()
            .filter_map(|handle| self.entry(*handle))
            .filter(|entry| entry.refcount > 0)
            .count();
        if leaked > 0 {
            warn!(leaked, "resources_outstanding_at_clear");
        }
        for handle in &handles {
            self.evict(*handle);
        }
        handles.len()
    }

    fn insert(&mut self, key: &str, asset: Asset) -> ResourceHandle {
        let entry = CacheEntry {
            key: key.to_string(),
            asset,
            refcount: 1,
        };
        let slot_index = match self.free_slots.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[slot_index as usize];
        slot.entry = Some(entry);
        let handle = ResourceHandle {
            slot: slot_index,
            generation: slot.generation,
        };
        self.by_key.insert(key.to_string(), handle);
        handle
    }

    fn evict(&mut self, handle: ResourceHandle) {
        let Some(slot) = self.slots.get_mut(handle.slot as usize) else {
            return;
        };
        if slot.generation != handle.generation {
            return;
        }
        let Some(entry) = slot.entry.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.slot);
        self.by_key.remove(&entry.key);
        info!(key = entry.key.as_str(), "resource_evicted");
        self.store.unload(&entry.key, entry.asset);
    }

    fn entry(&self, handle: ResourceHandle) -> Option<&CacheEntry> {
        self.slots
            .get(handle.slot as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, handle: ResourceHandle) -> Option<&mut CacheEntry> {
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }
}
