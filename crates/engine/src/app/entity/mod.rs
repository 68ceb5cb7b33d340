mod boss;
mod enemy;
mod player;
mod projectile;

use std::rc::Rc;

use rand::rngs::StdRng;

pub use boss::{
    BossDef, BossMovementDef, BossPhaseDef, BossState, FirePattern, InvalidPhaseTransition,
    PatternSlot, BOSS_HITBOX, BOSS_SIZE, ULTIMATE_COOLDOWN_SECONDS, ULTIMATE_FIRE_PERIOD_SECONDS,
};
pub use enemy::{formation, EnemyMode, EnemyState, ENEMY_SIZE, ENEMY_TEXTURE};
pub use player::{PlayerState, PLAYER_SIZE, PLAYER_SPEED, PLAYER_TEXTURE};
pub use projectile::{
    ProjectileMotion, ProjectileSpec, ProjectileState, ARROW_TEXTURE, DEFAULT_PROJECTILE_TTL,
};

use super::collision::CollisionPeer;
use super::scene::{CommandQueue, SceneEvent};
use super::{
    Collision2D, Component, ComponentTable, InputIntent, InputSnapshot, LoadError, OwnerContext,
    ResourceManager, SourceRect, Texture, Transform, Vec2,
};

/// Every texture key entity constructors reference on their own. Boss bodies come from their
/// definitions instead.
pub const BUILTIN_TEXTURE_KEYS: [&str; 8] = [
    PLAYER_TEXTURE,
    ENEMY_TEXTURE,
    ARROW_TEXTURE,
    boss::RAIN_TEXTURE,
    boss::SPREAD_TEXTURE,
    boss::GHOST_TEXTURE,
    boss::SLASH_TEXTURE,
    boss::ULTIMATE_TEXTURE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKindTag {
    Player,
    Enemy,
    Boss,
    Projectile,
}

#[derive(Debug, Clone)]
pub enum EntityKind {
    Player(PlayerState),
    Enemy(EnemyState),
    Boss(Box<BossState>),
    Projectile(ProjectileState),
}

impl EntityKind {
    pub fn tag(&self) -> EntityKindTag {
        match self {
            EntityKind::Player(_) => EntityKindTag::Player,
            EntityKind::Enemy(_) => EntityKindTag::Enemy,
            EntityKind::Boss(_) => EntityKindTag::Boss,
            EntityKind::Projectile(_) => EntityKindTag::Projectile,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub key: String,
    pub source: Option<SourceRect>,
    pub layer: i32,
}

impl TextureDesc {
    pub fn new(key: impl Into<String>, layer: i32) -> Self {
        Self {
            key: key.into(),
            source: None,
            layer,
        }
    }
}

/// Everything needed to construct an entity. Building acquires the texture.
#[derive(Debug, Clone)]
pub struct EntityDesc {
    pub kind: EntityKind,
    pub transform: Transform,
    pub texture: Option<TextureDesc>,
    pub collision: Option<Collision2D>,
    pub input: bool,
}

impl EntityDesc {
    pub fn player(position: Vec2) -> Self {
        player::desc(position)
    }

    pub fn enemy(position: Vec2) -> Self {
        enemy::desc(position)
    }

    pub fn boss(def: Rc<BossDef>, position: Vec2) -> Self {
        boss::desc(def, position)
    }

    pub fn projectile(spec: ProjectileSpec) -> Self {
        projectile::desc(spec)
    }

    pub fn tag(&self) -> EntityKindTag {
        self.kind.tag()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerView {
    pub id: EntityId,
    pub center: Vec2,
}

/// Scene state handed to entity behavior for one tick.
pub struct UpdateContext<'a> {
    pub dt: f32,
    pub input: &'a InputSnapshot,
    pub world_size: Vec2,
    pub player: Option<PlayerView>,
    pub rng: &'a mut StdRng,
    pub(crate) commands: &'a mut CommandQueue,
}

impl UpdateContext<'_> {
    pub fn spawn(&mut self, desc: EntityDesc) {
        self.commands.spawn(desc);
    }

    pub fn emit(&mut self, event: SceneEvent) {
        self.commands.emit(event);
    }
}

/// The parts of an entity its behavior may touch while the kind state is borrowed.
pub struct Body<'a> {
    pub id: EntityId,
    pub components: &'a mut ComponentTable,
    destroy_requested: &'a mut bool,
}

impl Body<'_> {
    pub fn request_destroy(&mut self) {
        *self.destroy_requested = true;
    }
}

#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    components: ComponentTable,
    destroy_requested: bool,
    spawn_order: u64,
}

impl Entity {
    pub(crate) fn build(
        id: EntityId,
        desc: EntityDesc,
        resources: &mut ResourceManager,
    ) -> Result<Self, LoadError> {
        let mut components = ComponentTable::default().with(Component::Transform(desc.transform));
        if let Some(texture) = desc.texture {
            let acquired = Texture::acquire(&texture.key, texture.layer, resources)?
                .with_source(texture.source);
            components.insert(Component::Texture(acquired));
        }
        if desc.input {
            components.insert(Component::Input(InputIntent::default()));
        }
        if let Some(collision) = desc.collision {
            components.insert(Component::Collision2D(collision));
        }
        components.sync_collision();

        Ok(Self {
            id,
            kind: desc.kind,
            components,
            destroy_requested: false,
            spawn_order: 0,
        })
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut EntityKind {
        &mut self.kind
    }

    pub fn tag(&self) -> EntityKindTag {
        self.kind.tag()
    }

    pub fn components(&self) -> &ComponentTable {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut ComponentTable {
        &mut self.components
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.components.transform()
    }

    pub fn is_pending_destroy(&self) -> bool {
        self.destroy_requested
    }

    /// Marks the entity for removal at the end of the frame. Idempotent.
    pub fn request_destroy(&mut self) {
        self.destroy_requested = true;
    }

    pub fn spawn_order(&self) -> u64 {
        self.spawn_order
    }

    pub(crate) fn set_spawn_order(&mut self, spawn_order: u64) {
        self.spawn_order = spawn_order;
    }

    pub fn as_player(&self) -> Option<&PlayerState> {
        match &self.kind {
            EntityKind::Player(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_enemy(&self) -> Option<&EnemyState> {
        match &self.kind {
            EntityKind::Enemy(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_boss(&self) -> Option<&BossState> {
        match &self.kind {
            EntityKind::Boss(state) => Some(&**state),
            _ => None,
        }
    }

    pub fn as_boss_mut(&mut self) -> Option<&mut BossState> {
        match &mut self.kind {
            EntityKind::Boss(state) => Some(&mut **state),
            _ => None,
        }
    }

    pub fn as_projectile(&self) -> Option<&ProjectileState> {
        match &self.kind {
            EntityKind::Projectile(state) => Some(state),
            _ => None,
        }
    }

    /// Components first, then kind behavior, then the hitbox is resynced to the moved transform.
    pub(crate) fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        let owner = OwnerContext {
            id: self.id,
            dt: ctx.dt,
            transform: self.components.transform().copied(),
            input: ctx.input,
        };
        self.components.update_all(&owner);

        let mut body = Body {
            id: self.id,
            components: &mut self.components,
            destroy_requested: &mut self.destroy_requested,
        };
        match &mut self.kind {
            EntityKind::Player(state) => player::update(state, &mut body, ctx),
            EntityKind::Enemy(state) => enemy::update(state, &mut body, ctx),
            EntityKind::Boss(state) => boss::update(state, &mut body, ctx),
            EntityKind::Projectile(state) => projectile::update(state, &mut body, ctx),
        }

        self.components.sync_collision();
    }

    /// What the other side of a collision pair sees of this entity.
    pub(crate) fn collision_peer(&self) -> Option<CollisionPeer> {
        let collision = self.components.collision()?;
        let (firer, damage) = match &self.kind {
            EntityKind::Projectile(state) => (state.firer(), state.live_damage()),
            _ => (None, 0),
        };
        Some(CollisionPeer {
            id: self.id,
            kind: self.tag(),
            layer: collision.layer,
            bounds: collision.bounds(),
            firer,
            damage,
            pending_destroy: self.destroy_requested,
        })
    }

    pub(crate) fn release_resources(&mut self, resources: &mut ResourceManager) {
        self.components.release_resources(resources);
    }
}
