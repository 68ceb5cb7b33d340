use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use image::ImageReader;
use tracing::debug;

use crate::asset_keys::validate_asset_key;

use super::{Asset, AssetStore, AssetStoreError, TextureData};

/// Loads assets from a directory tree. The key's extension picks the decoder: `png` and `bmp`
/// become textures, `txt` and `json` become text, anything else stays raw bytes.
#[derive(Debug, Clone)]
pub struct FileAssetStore {
    root: PathBuf,
}

impl FileAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, AssetStoreError> {
        validate_asset_key(key).map_err(|error| AssetStoreError::InvalidKey {
            key: key.to_string(),
            reason: error.to_string(),
        })?;
        Ok(self.root.join(key))
    }
}

impl AssetStore for FileAssetStore {
    fn load(&mut self, key: &str) -> Result<Asset, AssetStoreError> {
        let path = self.resolve(key)?;
        let bytes = fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => AssetStoreError::NotFound {
                key: key.to_string(),
            },
            _ => AssetStoreError::Io {
                key: key.to_string(),
                source,
            },
        })?;
        debug!(key, path = %path.display(), bytes = bytes.len(), "asset_read");
        decode_asset(key, bytes)
    }
}

fn decode_asset(key: &str, bytes: Vec<u8>) -> Result<Asset, AssetStoreError> {
    let extension = Path::new(key)
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or("");
    match extension {
        "png" | "bmp" => decode_texture(key, bytes).map(Asset::Texture),
        "txt" | "json" => String::from_utf8(bytes)
            .map(Asset::Text)
            .map_err(|error| AssetStoreError::Decode {
                key: key.to_string(),
                reason: error.to_string(),
            }),
        _ => Ok(Asset::Bytes(bytes)),
    }
}

fn decode_texture(key: &str, bytes: Vec<u8>) -> Result<TextureData, AssetStoreError> {
    let decode_error = |reason: String| AssetStoreError::Decode {
        key: key.to_string(),
        reason,
    };
    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|error| decode_error(format!("format_probe_failed:{error}")))?
        .decode()
        .map_err(|error| decode_error(format!("decode_failed:{error}")))?;
    let image = decoded.to_rgba8();
    Ok(TextureData {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}
