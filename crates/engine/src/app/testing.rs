use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::entity::BUILTIN_TEXTURE_KEYS;
use super::{
    Asset, AssetStore, AssetStoreError, DialogueView, InputSnapshot, InputSource, RenderTarget,
    ResourceHandle, ResourceManager, TextureData, TextureDraw, Vec2,
};

#[derive(Debug, Default)]
struct MemoryAssets {
    assets: HashMap<String, Asset>,
    loads: Vec<String>,
    unloads: Vec<String>,
}

/// In-memory store. Clones share state so a test can inspect loads after handing it off.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryAssetStore {
    inner: Rc<RefCell<MemoryAssets>>,
}

impl MemoryAssetStore {
    pub(crate) fn with_builtin_textures() -> Self {
        let mut store = Self::default();
        for key in BUILTIN_TEXTURE_KEYS {
            store.insert_texture(key, 2, 2);
        }
        store
    }

    pub(crate) fn insert_texture(&mut self, key: &str, width: u32, height: u32) {
        self.inner.borrow_mut().assets.insert(
            key.to_string(),
            Asset::Texture(TextureData::solid(width, height, [255, 255, 255, 255])),
        );
    }

    pub(crate) fn insert_text(&mut self, key: &str, text: &str) {
        self.inner
            .borrow_mut()
            .assets
            .insert(key.to_string(), Asset::Text(text.to_string()));
    }

    pub(crate) fn remove(&mut self, key: &str) {
        self.inner.borrow_mut().assets.remove(key);
    }

    pub(crate) fn load_count(&self, key: &str) -> usize {
        self.inner
            .borrow()
            .loads
            .iter()
            .filter(|loaded| loaded.as_str() == key)
            .count()
    }

    pub(crate) fn unloaded(&self) -> Vec<String> {
        self.inner.borrow().unloads.clone()
    }
}

impl AssetStore for MemoryAssetStore {
    fn load(&mut self, key: &str) -> Result<Asset, AssetStoreError> {
        let mut inner = self.inner.borrow_mut();
        let asset = inner
            .assets
            .get(key)
            .cloned()
            .ok_or_else(|| AssetStoreError::NotFound {
                key: key.to_string(),
            })?;
        inner.loads.push(key.to_string());
        Ok(asset)
    }

    fn unload(&mut self, key: &str, _asset: Asset) {
        self.inner.borrow_mut().unloads.push(key.to_string());
    }
}

pub(crate) fn builtin_resources() -> (ResourceManager, MemoryAssetStore) {
    let store = MemoryAssetStore::with_builtin_textures();
    (ResourceManager::new(Box::new(store.clone())), store)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RecordedDraw {
    pub(crate) handle: ResourceHandle,
    pub(crate) layer: i32,
    pub(crate) position: Vec2,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingTarget {
    pub(crate) frames_begun: u32,
    pub(crate) frames_ended: u32,
    pub(crate) draws: Vec<RecordedDraw>,
    pub(crate) dialogue_lines: Vec<String>,
}

impl RenderTarget for RecordingTarget {
    fn begin_frame(&mut self) {
        self.frames_begun += 1;
        self.draws.clear();
        self.dialogue_lines.clear();
    }

    fn draw_texture(&mut self, draw: &TextureDraw<'_>) {
        self.draws.push(RecordedDraw {
            handle: draw.handle,
            layer: draw.layer,
            position: draw.dest.position,
        });
    }

    fn draw_dialogue(&mut self, view: &DialogueView<'_>) {
        self.dialogue_lines.push(view.line.to_string());
    }

    fn end_frame(&mut self) {
        self.frames_ended += 1;
    }
}

/// Replays queued snapshots, then empty ones.
#[derive(Debug, Default)]
pub(crate) struct ScriptedInput {
    queued: VecDeque<InputSnapshot>,
}

impl ScriptedInput {
    pub(crate) fn push(&mut self, snapshot: InputSnapshot) {
        self.queued.push_back(snapshot);
    }
}

impl InputSource for ScriptedInput {
    fn snapshot_for_tick(&mut self) -> InputSnapshot {
        self.queued.pop_front().unwrap_or_default()
    }
}
