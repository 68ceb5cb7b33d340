use thiserror::Error;
use tracing::{error, info, warn};

use super::collision::CollisionReport;
use super::scene::SpawnError;
use super::{
    DefinitionError, DialogueError, DialogueManager, InputAction, InputSnapshot, InputSource,
    LoadError, RenderTarget, ResourceManager, Scene, SceneCommand, SceneEvent, SceneKey, Vec2,
};

#[derive(Debug, Error)]
pub enum SceneLoadError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("unknown scene {key}")]
    UnknownScene { key: SceneKey },
    #[error("scene {key} has no player")]
    MissingPlayer { key: SceneKey },
}

/// Game-specific scene content and flow, plugged into the application loop.
pub trait SceneDirector {
    fn initial_scene(&self) -> SceneKey;

    /// Populates a freshly constructed scene. The returned command runs once the scene is live.
    fn load_scene(
        &mut self,
        key: &SceneKey,
        scene: &mut Scene,
        resources: &mut ResourceManager,
    ) -> Result<SceneCommand, SceneLoadError>;

    fn on_scene_event(&mut self, event: &SceneEvent, scene: &Scene) -> SceneCommand;

    fn title(&self, scene: &Scene) -> String {
        format!("{} | score {}", scene.key(), scene.score())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApplicationConfig {
    pub world_size: Vec2,
    /// Upper bound on the dt handed to entities.
    pub max_update_dt: f32,
    pub seed: u64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            world_size: Vec2::new(1920.0, 1080.0),
            max_update_dt: 0.1,
            seed: 0x0B0D,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Quit,
}

/// Owns the active scene, the resource cache and the dialogue manager.
///
/// Scene swaps requested during a frame are applied at the start of the next one. The next
/// scene is fully built before the current one is torn down, so a failed load keeps the
/// current scene running.
pub struct Application {
    config: ApplicationConfig,
    resources: ResourceManager,
    dialogue: DialogueManager,
    director: Box<dyn SceneDirector>,
    scene: Option<Scene>,
    pending_scene: Option<SceneKey>,
    quit_requested: bool,
    scenes_loaded: u64,
    frame: u64,
    ran_collision_pass: bool,
}

impl Application {
    pub fn new(
        config: ApplicationConfig,
        resources: ResourceManager,
        director: Box<dyn SceneDirector>,
    ) -> Self {
        Self {
            config,
            resources,
            dialogue: DialogueManager::default(),
            director,
            scene: None,
            pending_scene: None,
            quit_requested: false,
            scenes_loaded: 0,
            frame: 0,
            ran_collision_pass: false,
        }
    }

    /// Loads the director's initial scene. Failure here is fatal to the caller.
    pub fn start(&mut self) -> Result<(), SceneLoadError> {
        let key = self.director.initial_scene();
        self.start_at(key)
    }

    pub fn start_at(&mut self, key: SceneKey) -> Result<(), SceneLoadError> {
        let (scene, command) = self.build_scene(key)?;
        if let Some(mut previous) = self.scene.replace(scene) {
            previous.teardown(&mut self.resources);
        }
        self.apply_command(command);
        Ok(())
    }

    pub fn request_transition(&mut self, key: SceneKey) {
        self.pending_scene = Some(key);
    }

    pub fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    pub fn is_quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    /// Runs `f` against the active scene and the cache it borrows from.
    pub fn with_scene<R>(
        &mut self,
        f: impl FnOnce(&mut Scene, &mut ResourceManager) -> R,
    ) -> Option<R> {
        let scene = self.scene.as_mut()?;
        Some(f(scene, &mut self.resources))
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    pub fn dialogue(&self) -> &DialogueManager {
        &self.dialogue
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn entity_count(&self) -> usize {
        self.scene.as_ref().map(Scene::entity_count).unwrap_or(0)
    }

    pub fn title(&self) -> Option<String> {
        self.scene.as_ref().map(|scene| self.director.title(scene))
    }

    /// The collision pass of the last tick, if that tick ran gameplay.
    pub fn last_tick_collisions(&self) -> Option<&CollisionReport> {
        if !self.ran_collision_pass {
            return None;
        }
        self.scene.as_ref().map(Scene::last_collision)
    }

    /// One fixed step: transition, dialogue or gameplay, then event routing.
    pub fn tick(&mut self, dt: f32, input: &InputSnapshot) -> FrameOutcome {
        self.frame = self.frame.saturating_add(1);
        self.ran_collision_pass = false;
        if let Some(key) = self.pending_scene.take() {
            self.transition(key);
        }
        if input.was_pressed(InputAction::Quit) {
            self.quit_requested = true;
        }
        if self.quit_requested {
            return FrameOutcome::Quit;
        }

        if self.dialogue.is_active() {
            self.tick_dialogue(input);
        } else if let Some(scene) = self.scene.as_mut() {
            scene.update(dt.min(self.config.max_update_dt), input, &mut self.resources);
            scene.collision_pass();
            scene.apply_pending_removals(&mut self.resources);
            self.ran_collision_pass = true;
        }
        self.route_events();

        if self.quit_requested {
            FrameOutcome::Quit
        } else {
            FrameOutcome::Continue
        }
    }

    pub fn render(&self, target: &mut dyn RenderTarget) {
        target.begin_frame();
        if let Some(scene) = &self.scene {
            scene.render(&self.resources, target);
        }
        if let Some(view) = self.dialogue.view(&self.resources) {
            target.draw_dialogue(&view);
        }
        target.end_frame();
    }

    /// Samples, ticks and renders once.
    pub fn frame_once(
        &mut self,
        dt: f32,
        input: &mut dyn InputSource,
        target: &mut dyn RenderTarget,
    ) -> FrameOutcome {
        let snapshot = input.snapshot_for_tick();
        let outcome = self.tick(dt, &snapshot);
        self.render(target);
        outcome
    }

    /// Releases the scene, then the dialogue, then everything left in the cache.
    pub fn shutdown(&mut self) {
        let entities = self
            .scene
            .take()
            .map(|mut scene| scene.teardown(&mut self.resources))
            .unwrap_or(0);
        self.dialogue.reset(&mut self.resources);
        let evicted = self.resources.clear();
        info!(entities, evicted, frames = self.frame, "application_shutdown");
    }

    fn build_scene(&mut self, key: SceneKey) -> Result<(Scene, SceneCommand), SceneLoadError> {
        let seed = self.config.seed.wrapping_add(self.scenes_loaded);
        let mut scene = Scene::new(key.clone(), self.config.world_size, seed);
        match self.director.load_scene(&key, &mut scene, &mut self.resources) {
            Ok(command) => {
                self.scenes_loaded = self.scenes_loaded.saturating_add(1);
                info!(
                    scene = %key,
                    entities = scene.pending_add_count(),
                    cached = self.resources.cached_count(),
                    "scene_loaded"
                );
                Ok((scene, command))
            }
            Err(error) => {
                scene.teardown(&mut self.resources);
                Err(error)
            }
        }
    }

    fn transition(&mut self, key: SceneKey) {
        match self.build_scene(key.clone()) {
            Ok((scene, command)) => {
                self.dialogue.reset(&mut self.resources);
                if let Some(mut previous) = self.scene.replace(scene) {
                    previous.teardown(&mut self.resources);
                }
                self.apply_command(command);
            }
            Err(error) => {
                error!(scene = %key, error = %error, "scene_transition_failed");
            }
        }
    }

    fn tick_dialogue(&mut self, input: &InputSnapshot) {
        if input.was_pressed(InputAction::Advance) {
            self.dialogue.advance();
        }
        self.dialogue.tick();
        if let Some(command) = self.dialogue.take_finished(&mut self.resources) {
            self.apply_command(command);
        }
    }

    fn route_events(&mut self) {
        let Some(scene) = self.scene.as_mut() else {
            return;
        };
        let events = scene.drain_events();
        if events.is_empty() {
            return;
        }
        let scene = &*scene;
        let commands: Vec<SceneCommand> = events
            .iter()
            .map(|event| match event {
                SceneEvent::DialogueRequested { script } => {
                    SceneCommand::dialogue(script.clone(), SceneCommand::None)
                }
                other => self.director.on_scene_event(other, scene),
            })
            .collect();
        for command in commands {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: SceneCommand) {
        match command {
            SceneCommand::None => {}
            SceneCommand::PlayDialogue { script, on_finish } => {
                match self.dialogue.trigger(&script, *on_finish.clone(), &mut self.resources) {
                    Ok(()) => {}
                    Err(DialogueError::AlreadyActive(error)) => {
                        warn!(
                            script = %script,
                            active = %error.active_script,
                            "dialogue_request_dropped"
                        );
                    }
                    Err(error) => {
                        warn!(script = %script, error = %error, "dialogue_load_failed");
                        self.apply_command(*on_finish);
                    }
                }
            }
            SceneCommand::SwitchTo(key) => {
                self.pending_scene = Some(key);
            }
            SceneCommand::Quit => {
                self.quit_requested = true;
            }
        }
    }
}
