mod application;
mod assets;
mod collision;
mod component;
mod definition;
mod dialogue;
mod entity;
mod geometry;
mod input;
mod loop_runner;
mod metrics;
mod render;
mod rendering;
mod resources;
mod scene;
#[cfg(test)]
pub(crate) mod testing;

pub use application::{Application, ApplicationConfig, FrameOutcome, SceneDirector, SceneLoadError};
pub use assets::FileAssetStore;
pub use collision::{CollisionPeer, CollisionReport, ResponseError};
pub use component::{
    Collision2D, CollisionLayer, CollisionResponse, Component, ComponentKind, ComponentTable,
    InputIntent, LayerMask, OwnerContext, Texture, Transform, COMPONENT_KIND_COUNT,
};
pub use definition::{load_definition, parse_definition, DefinitionError};
pub use dialogue::{
    AlreadyActiveError, DialogueError, DialogueManager, DialogueScript, DialogueState,
};
pub use entity::{
    formation, BossDef, BossMovementDef, BossPhaseDef, BossState, EnemyMode, EnemyState, Entity,
    EntityDesc, EntityId, EntityKind, EntityKindTag, FirePattern, InvalidPhaseTransition,
    PatternSlot, PlayerState, ProjectileMotion, ProjectileSpec, ProjectileState, TextureDesc,
    ARROW_TEXTURE, BOSS_HITBOX, BOSS_SIZE, BUILTIN_TEXTURE_KEYS, DEFAULT_PROJECTILE_TTL,
    ENEMY_SIZE, ENEMY_TEXTURE, PLAYER_SIZE, PLAYER_SPEED, PLAYER_TEXTURE,
    ULTIMATE_COOLDOWN_SECONDS, ULTIMATE_FIRE_PERIOD_SECONDS,
};
pub use geometry::{Aabb, Vec2};
pub use input::{InputAction, InputSnapshot, InputSource};
pub use loop_runner::{run_app, run_app_with_metrics, AppError, LoopConfig};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use render::{DialogueView, RenderTarget, SourceRect, TextureDraw, BACKGROUND_LAYER};
pub use rendering::{FrameRenderer, Viewport};
pub use resources::{
    Asset, AssetStore, AssetStoreError, LoadError, ResourceHandle, ResourceManager,
    StaleHandleError, TextureData,
};
pub use scene::{CommandQueue, Scene, SceneCommand, SceneEvent, SceneKey, SpawnError};
