use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::collision::{run_collision_pass, CollisionReport};
use super::entity::{EntityIdAllocator, PlayerView, UpdateContext};
use super::{
    Entity, EntityDesc, EntityId, EntityKindTag, InputSnapshot, LoadError, RenderTarget,
    ResourceManager, Texture, Transform, Vec2, BACKGROUND_LAYER,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SceneKey(String);

impl SceneKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SceneKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SceneKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SceneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    /// Runs a dialogue script, then applies `on_finish`.
    PlayDialogue {
        script: String,
        on_finish: Box<SceneCommand>,
    },
    SwitchTo(SceneKey),
    Quit,
}

impl SceneCommand {
    pub fn dialogue(script: impl Into<String>, on_finish: SceneCommand) -> Self {
        SceneCommand::PlayDialogue {
            script: script.into(),
            on_finish: Box::new(on_finish),
        }
    }
}

/// Gameplay facts raised during a frame, drained by the application afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    PlayerDefeated { player: EntityId },
    EnemyDefeated { enemy: EntityId },
    BossPhaseChanged { boss: EntityId, phase: usize },
    BossDefeated { boss: EntityId },
    TargetHit { target: EntityId, kind: EntityKindTag },
    DialogueRequested { script: String },
}

/// Requests raised while the live set is borrowed. Applied by the scene between passes.
#[derive(Debug, Default)]
pub struct CommandQueue {
    spawns: Vec<EntityDesc>,
    events: Vec<SceneEvent>,
}

impl CommandQueue {
    pub fn spawn(&mut self, desc: EntityDesc) {
        self.spawns.push(desc);
    }

    pub fn emit(&mut self, event: SceneEvent) {
        self.events.push(event);
    }
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("scene already has a player ({existing:?})")]
    DuplicatePlayer { existing: EntityId },
}

/// The live entity set of one level and its per-frame pipeline.
///
/// Frame order is `update` (which first applies last frame's spawns), `collision_pass`,
/// `apply_pending_removals`. Spawns requested at any point land in the pending-add queue and
/// join the live set at the start of the next `update`.
#[derive(Debug)]
pub struct Scene {
    key: SceneKey,
    world_size: Vec2,
    ids: EntityIdAllocator,
    entities: Vec<Entity>,
    pending_add: Vec<Entity>,
    commands: CommandQueue,
    events: Vec<SceneEvent>,
    background: Option<Texture>,
    rng: StdRng,
    next_spawn_order: u64,
    frame: u64,
    score: u32,
    last_collision: CollisionReport,
}

impl Scene {
    pub fn new(key: impl Into<SceneKey>, world_size: Vec2, seed: u64) -> Self {
        Self {
            key: key.into(),
            world_size,
            ids: EntityIdAllocator::default(),
            entities: Vec::new(),
            pending_add: Vec::new(),
            commands: CommandQueue::default(),
            events: Vec::new(),
            background: None,
            rng: StdRng::seed_from_u64(seed),
            next_spawn_order: 0,
            frame: 0,
            score: 0,
            last_collision: CollisionReport::default(),
        }
    }

    pub fn key(&self) -> &SceneKey {
        &self.key
    }

    pub fn world_size(&self) -> Vec2 {
        self.world_size
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn last_collision(&self) -> &CollisionReport {
        &self.last_collision
    }

    /// Builds the entity now (acquiring its texture) and queues it for the next frame.
    pub fn spawn(
        &mut self,
        desc: EntityDesc,
        resources: &mut ResourceManager,
    ) -> Result<EntityId, SpawnError> {
        if desc.tag() == EntityKindTag::Player {
            if let Some(existing) = self.player_id() {
                return Err(SpawnError::DuplicatePlayer { existing });
            }
        }

        let id = self.ids.allocate();
        let tag = desc.tag();
        let mut entity = Entity::build(id, desc, resources)?;
        entity.set_spawn_order(self.next_spawn_order);
        self.next_spawn_order = self.next_spawn_order.saturating_add(1);
        debug!(scene = %self.key, entity = id.0, kind = ?tag, "entity_queued");
        self.pending_add.push(entity);
        Ok(id)
    }

    /// Marks a live or queued entity for removal. Returns false for unknown ids.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        match self.entity_mut(id) {
            Some(entity) => {
                entity.request_destroy();
                true
            }
            None => false,
        }
    }

    pub fn set_background(
        &mut self,
        key: &str,
        resources: &mut ResourceManager,
    ) -> Result<(), LoadError> {
        let texture = Texture::acquire(key, BACKGROUND_LAYER, resources)?;
        if let Some(previous) = self.background.replace(texture) {
            previous.release(resources);
        }
        Ok(())
    }

    pub fn background(&self) -> Option<&Texture> {
        self.background.as_ref()
    }

    /// Moves queued spawns into the live set. Ids only grow, so the set stays sorted by id.
    pub fn apply_pending_adds(&mut self) -> usize {
        let added = self.pending_add.len();
        self.entities.append(&mut self.pending_add);
        added
    }

    pub fn update(&mut self, dt: f32, input: &InputSnapshot, resources: &mut ResourceManager) {
        self.apply_pending_adds();
        self.frame = self.frame.saturating_add(1);

        let player = self.live_player_view();
        let mut ctx = UpdateContext {
            dt,
            input,
            world_size: self.world_size,
            player,
            rng: &mut self.rng,
            commands: &mut self.commands,
        };
        for entity in self
            .entities
            .iter_mut()
            .filter(|entity| !entity.is_pending_destroy())
        {
            entity.update(&mut ctx);
        }

        self.flush_commands(resources);
    }

    /// Tests every eligible pair once and runs both responses on overlap.
    pub fn collision_pass(&mut self) -> &CollisionReport {
        self.last_collision = run_collision_pass(&mut self.entities, &mut self.commands);
        let events = std::mem::take(&mut self.commands.events);
        self.record_events(events);
        &self.last_collision
    }

    /// Removes entities flagged for destruction and releases their resources. Spawns queued
    /// by collision responses are built here. Returns the number removed.
    pub fn apply_pending_removals(&mut self, resources: &mut ResourceManager) -> usize {
        let mut removed = 0;
        for list in [&mut self.entities, &mut self.pending_add] {
            let mut index = 0;
            while index < list.len() {
                if list[index].is_pending_destroy() {
                    let mut entity = list.remove(index);
                    debug!(entity = entity.id().0, kind = ?entity.tag(), "entity_removed");
                    entity.release_resources(resources);
                    removed += 1;
                } else {
                    index += 1;
                }
            }
        }
        self.flush_commands(resources);
        removed
    }

    /// Background first, then live entities by (layer, spawn order).
    pub fn render(&self, resources: &ResourceManager, target: &mut dyn RenderTarget) {
        if let Some(background) = &self.background {
            let dest = Transform::new(Vec2::ZERO, self.world_size);
            background.draw(&dest, resources, target);
        }

        let mut visible: Vec<&Entity> = self
            .entities
            .iter()
            .filter(|entity| !entity.is_pending_destroy())
            .collect();
        visible.sort_by_key(|entity| {
            let layer = entity
                .components()
                .texture()
                .map(|texture| texture.layer)
                .unwrap_or(0);
            (layer, entity.spawn_order())
        });
        for entity in visible {
            entity.components().draw(resources, target);
        }
    }

    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    /// Releases every entity and the background. The scene is empty afterwards.
    pub fn teardown(&mut self, resources: &mut ResourceManager) -> usize {
        let mut released = 0;
        for mut entity in self.entities.drain(..).chain(self.pending_add.drain(..)) {
            entity.release_resources(resources);
            released += 1;
        }
        if let Some(background) = self.background.take() {
            background.release(resources);
        }
        let dropped_spawns = self.commands.spawns.len();
        self.commands = CommandQueue::default();
        self.events.clear();
        info!(scene = %self.key, released, dropped_spawns, "scene_teardown");
        released
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn pending_adds(&self) -> &[Entity] {
        &self.pending_add
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        match self.entities.binary_search_by_key(&id, Entity::id) {
            Ok(index) => self.entities.get(index),
            Err(_) => self.pending_add.iter().find(|entity| entity.id() == id),
        }
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        match self.entities.binary_search_by_key(&id, Entity::id) {
            Ok(index) => self.entities.get_mut(index),
            Err(_) => self.pending_add.iter_mut().find(|entity| entity.id() == id),
        }
    }

    /// True while the entity is in the live set and not flagged for destruction.
    pub fn is_live(&self, id: EntityId) -> bool {
        self.entities
            .binary_search_by_key(&id, Entity::id)
            .map(|index| !self.entities[index].is_pending_destroy())
            .unwrap_or(false)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn pending_add_count(&self) -> usize {
        self.pending_add.len()
    }

    pub fn count_kind(&self, tag: EntityKindTag) -> usize {
        self.entities
            .iter()
            .filter(|entity| entity.tag() == tag)
            .count()
    }

    /// The player, live or queued.
    pub fn player_id(&self) -> Option<EntityId> {
        self.entities
            .iter()
            .chain(self.pending_add.iter())
            .find(|entity| entity.tag() == EntityKindTag::Player && !entity.is_pending_destroy())
            .map(Entity::id)
    }

    fn live_player_view(&self) -> Option<PlayerView> {
        self.entities
            .iter()
            .filter(|entity| !entity.is_pending_destroy())
            .find_map(|entity| {
                let defeated = entity.as_player()?.is_defeated();
                let transform = entity.transform()?;
                (!defeated).then(|| PlayerView {
                    id: entity.id(),
                    center: transform.center(),
                })
            })
    }

    fn flush_commands(&mut self, resources: &mut ResourceManager) {
        let spawns = std::mem::take(&mut self.commands.spawns);
        for desc in spawns {
            let tag = desc.tag();
            if let Err(error) = self.spawn(desc, resources) {
                warn!(scene = %self.key, kind = ?tag, error = %error, "entity_spawn_rejected");
            }
        }
        let events = std::mem::take(&mut self.commands.events);
        self.record_events(events);
    }

    fn record_events(&mut self, events: Vec<SceneEvent>) {
        for event in &events {
            if let SceneEvent::TargetHit { .. } = event {
                self.score = self.score.saturating_add(1);
            }
        }
        self.events.extend(events);
    }
}
