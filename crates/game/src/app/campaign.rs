use std::rc::Rc;

use bow_engine::app::{
    formation, BossDef, EntityDesc, EntityKindTag, ResourceManager, Scene, SceneCommand,
    SceneDirector, SceneEvent, SceneKey, SceneLoadError, Vec2, BOSS_SIZE, PLAYER_SIZE,
};
use serde::Deserialize;
use tracing::{info, warn};

pub(crate) const CAMPAIGN_KEY: &str = "levels/campaign.json";

const PLAYER_BOTTOM_MARGIN: f32 = 40.0;
const BOSS_TOP_MARGIN: f32 = 60.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LevelDef {
    pub(crate) key: String,
    pub(crate) name: String,
    /// Boss definition asset key.
    pub(crate) boss: String,
    #[serde(default)]
    pub(crate) background: Option<String>,
    #[serde(default)]
    pub(crate) intro: Option<String>,
    #[serde(default)]
    pub(crate) outro: Option<String>,
    #[serde(default)]
    pub(crate) enemies: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CampaignDef {
    pub(crate) levels: Vec<LevelDef>,
    #[serde(default)]
    pub(crate) defeat_dialogue: Option<String>,
    #[serde(default)]
    pub(crate) victory_dialogue: Option<String>,
}

/// Plays the levels in order: intro dialogue, fight, outro dialogue, next level. Losing plays
/// the defeat dialogue and quits; beating the last boss plays the victory dialogue and quits.
#[derive(Debug)]
pub(crate) struct CampaignDirector {
    campaign: CampaignDef,
    boss_names: Vec<Option<String>>,
}

impl CampaignDirector {
    pub(crate) fn new(campaign: CampaignDef) -> Self {
        let boss_names = vec![None; campaign.levels.len()];
        Self {
            campaign,
            boss_names,
        }
    }

    fn level_index(&self, key: &SceneKey) -> Option<usize> {
        self.campaign
            .levels
            .iter()
            .position(|level| level.key == key.as_str())
    }

    /// What runs once `index` is beaten: the next level, or the ending.
    fn after_level(&self, index: usize) -> SceneCommand {
        match self.campaign.levels.get(index + 1) {
            Some(next) => SceneCommand::SwitchTo(SceneKey::from(next.key.as_str())),
            None => match &self.campaign.victory_dialogue {
                Some(script) => SceneCommand::dialogue(script.clone(), SceneCommand::Quit),
                None => SceneCommand::Quit,
            },
        }
    }
}

impl SceneDirector for CampaignDirector {
    fn initial_scene(&self) -> SceneKey {
        self.campaign
            .levels
            .first()
            .map(|level| SceneKey::from(level.key.as_str()))
            .unwrap_or_else(|| SceneKey::from("boss_1"))
    }

    fn load_scene(
        &mut self,
        key: &SceneKey,
        scene: &mut Scene,
        resources: &mut ResourceManager,
    ) -> Result<SceneCommand, SceneLoadError> {
        let index = self
            .level_index(key)
            .ok_or_else(|| SceneLoadError::UnknownScene { key: key.clone() })?;
        let level = self.campaign.levels[index].clone();
        let world = scene.world_size();

        if let Some(background) = &level.background {
            scene.set_background(background, resources)?;
        }
        scene.spawn(
            EntityDesc::player(Vec2::new(
                (world.x - PLAYER_SIZE.x) * 0.5,
                world.y - PLAYER_SIZE.y - PLAYER_BOTTOM_MARGIN,
            )),
            resources,
        )?;

        let def = Rc::new(BossDef::load(resources, &level.boss)?);
        self.boss_names[index] = Some(def.name.clone());
        scene.spawn(
            EntityDesc::boss(
                def,
                Vec2::new((world.x - BOSS_SIZE.x) * 0.5, BOSS_TOP_MARGIN),
            ),
            resources,
        )?;
        for position in formation(level.enemies, world) {
            scene.spawn(EntityDesc::enemy(position + Vec2::new(0.0, BOSS_SIZE.y)), resources)?;
        }
        if scene.player_id().is_none() {
            return Err(SceneLoadError::MissingPlayer { key: key.clone() });
        }

        info!(
            level = %level.key,
            boss = %level.boss,
            enemies = level.enemies,
            "campaign_level_started"
        );
        Ok(match level.intro {
            Some(script) => SceneCommand::dialogue(script, SceneCommand::None),
            None => SceneCommand::None,
        })
    }

    fn on_scene_event(&mut self, event: &SceneEvent, scene: &Scene) -> SceneCommand {
        let Some(index) = self.level_index(scene.key()) else {
            warn!(scene = %scene.key(), "campaign_event_for_unknown_scene");
            return SceneCommand::None;
        };
        match event {
            SceneEvent::BossDefeated { .. } => {
                info!(level = %scene.key(), score = scene.score(), "campaign_level_cleared");
                let next = self.after_level(index);
                match &self.campaign.levels[index].outro {
                    Some(script) => SceneCommand::dialogue(script.clone(), next),
                    None => next,
                }
            }
            SceneEvent::PlayerDefeated { .. } => {
                info!(level = %scene.key(), score = scene.score(), "campaign_lost");
                match &self.campaign.defeat_dialogue {
                    Some(script) => SceneCommand::dialogue(script.clone(), SceneCommand::Quit),
                    None => SceneCommand::Quit,
                }
            }
            _ => SceneCommand::None,
        }
    }

    fn title(&self, scene: &Scene) -> String {
        let boss = match self.level_index(scene.key()) {
            Some(index) => self.boss_names[index]
                .clone()
                .unwrap_or_else(|| self.campaign.levels[index].name.clone()),
            None => scene.key().to_string(),
        };
        format!(
            "OldBow | {boss} | score {} | enemies {}",
            scene.score(),
            scene.count_kind(EntityKindTag::Enemy)
        )
    }
}
