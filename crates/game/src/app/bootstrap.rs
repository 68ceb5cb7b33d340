use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bow_engine::app::{load_definition, DefinitionError};
use bow_engine::{resolve_app_paths, FileAssetStore, LoopConfig, ResourceManager, StartupError};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::campaign::{CampaignDef, CampaignDirector, CAMPAIGN_KEY};

pub(crate) const START_SCENE_ENV_VAR: &str = "OLDBOW_START_SCENE";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path} at {field}: {message}")]
    ParseConfig {
        path: PathBuf,
        field: String,
        message: String,
    },
    #[error("failed to load campaign: {0}")]
    Campaign(#[from] DefinitionError),
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) store: FileAssetStore,
    pub(crate) director: CampaignDirector,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== OldBow Startup ===");

    let paths = resolve_app_paths()?;
    let mut config = load_loop_config(&paths.config_path)?;
    apply_start_scene_override(&mut config, read_start_scene_env());
    info!(
        root = %paths.root.display(),
        assets_dir = %paths.assets_dir.display(),
        config = %paths.config_path.display(),
        start_scene = config.start_scene.as_deref().unwrap_or("<campaign>"),
        "startup"
    );

    let store = FileAssetStore::new(&paths.assets_dir);
    let campaign = load_campaign(&store)?;
    info!(levels = campaign.levels.len(), "campaign_loaded");

    Ok(AppWiring {
        config,
        store,
        director: CampaignDirector::new(campaign),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// A missing file means defaults. Present files may set any subset of fields.
pub(crate) fn load_loop_config(path: &Path) -> Result<LoopConfig, BootstrapError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Ok(LoopConfig::default());
        }
        Err(source) => {
            return Err(BootstrapError::ReadConfig {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut deserializer = serde_json::Deserializer::from_str(&raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        BootstrapError::ParseConfig {
            path: path.to_path_buf(),
            field: error.path().to_string(),
            message: error.inner().to_string(),
        }
    })
}

pub(crate) fn apply_start_scene_override(config: &mut LoopConfig, start_scene: Option<String>) {
    if let Some(scene) = start_scene {
        config.start_scene = Some(scene);
    }
}

fn read_start_scene_env() -> Option<String> {
    match env::var(START_SCENE_ENV_VAR) {
        Ok(value) if value.trim().is_empty() => None,
        Ok(value) => Some(value.trim().to_string()),
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                env_var = START_SCENE_ENV_VAR,
                error = %err,
                "unable to read start-scene env var; using campaign order"
            );
            None
        }
    }
}

/// Reads the campaign through a throwaway cache so nothing stays resident.
pub(crate) fn load_campaign(store: &FileAssetStore) -> Result<CampaignDef, BootstrapError> {
    let mut resources = ResourceManager::new(Box::new(store.clone()));
    let campaign: CampaignDef = load_definition(&mut resources, CAMPAIGN_KEY)?;
    if campaign.levels.is_empty() {
        return Err(DefinitionError::invalid(CAMPAIGN_KEY, "at least one level is required").into());
    }
    Ok(campaign)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_config_file_uses_defaults() {
        let temp = TempDir::new().expect("temp dir");
        let config = load_loop_config(&temp.path().join("oldbow.json")).expect("config");
        assert_eq!(config, LoopConfig::default());
    }

    #[test]
    fn config_file_overrides_selected_fields() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("oldbow.json");
        fs::write(&path, r#"{ "window_width": 800, "start_scene": "boss_2" }"#).expect("write");

        let config = load_loop_config(&path).expect("config");

        assert_eq!(config.window_width, 800);
        assert_eq!(config.start_scene.as_deref(), Some("boss_2"));
        assert_eq!(config.target_tps, LoopConfig::default().target_tps);
    }

    #[test]
    fn bad_config_reports_field_path() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("oldbow.json");
        fs::write(&path, r#"{ "target_tps": "fast" }"#).expect("write");

        match load_loop_config(&path).expect_err("invalid") {
            BootstrapError::ParseConfig { field, .. } => assert_eq!(field, "target_tps"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn env_start_scene_wins_over_config() {
        let mut config = LoopConfig {
            start_scene: Some("boss_1".to_string()),
            ..LoopConfig::default()
        };

        apply_start_scene_override(&mut config, None);
        assert_eq!(config.start_scene.as_deref(), Some("boss_1"));

        apply_start_scene_override(&mut config, Some("boss_3".to_string()));
        assert_eq!(config.start_scene.as_deref(), Some("boss_3"));
    }

    #[test]
    fn campaign_loads_from_asset_store() {
        let temp = TempDir::new().expect("temp dir");
        fs::create_dir_all(temp.path().join("levels")).expect("mkdir");
        fs::write(
            temp.path().join(CAMPAIGN_KEY),
            r#"{ "levels": [{ "key": "boss_1", "name": "One", "boss": "levels/boss_1.json" }] }"#,
        )
        .expect("write");

        let campaign = load_campaign(&FileAssetStore::new(temp.path())).expect("campaign");

        assert_eq!(campaign.levels.len(), 1);
        assert_eq!(campaign.levels[0].key, "boss_1");
    }

    #[test]
    fn empty_campaign_is_rejected() {
        let temp = TempDir::new().expect("temp dir");
        fs::create_dir_all(temp.path().join("levels")).expect("mkdir");
        fs::write(temp.path().join(CAMPAIGN_KEY), r#"{ "levels": [] }"#).expect("write");

        let error = load_campaign(&FileAssetStore::new(temp.path())).expect_err("empty");

        assert!(matches!(
            error,
            BootstrapError::Campaign(DefinitionError::Invalid { .. })
        ));
    }

    #[test]
    fn shipped_campaign_and_bosses_parse() {
        let assets = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets");
        let store = FileAssetStore::new(&assets);
        let campaign = load_campaign(&store).expect("shipped campaign");

        let mut resources = ResourceManager::new(Box::new(store));
        for level in &campaign.levels {
            bow_engine::BossDef::load(&mut resources, &level.boss).expect("boss definition");
            for script in [&level.intro, &level.outro].into_iter().flatten() {
                resources.read_text(script).expect("dialogue script");
            }
        }
    }
}
