use super::{
    Body, CollisionPeer, CommandQueue, Entity, EntityDesc, EntityId, EntityKind, EntityKindTag,
    TextureDesc, UpdateContext,
};
use crate::app::collision::ResponseError;
use crate::app::{Collision2D, CollisionLayer, LayerMask, Transform, Vec2};

pub const ARROW_TEXTURE: &str = "textures/arrow.png";
pub const DEFAULT_PROJECTILE_TTL: f32 = 8.0;
const PROJECTILE_LAYER: i32 = 40;
const PLAYER_ARROW_SIZE: Vec2 = Vec2::new(15.0, 40.0);
const PLAYER_ARROW_SPEED: f32 = 1000.0;
const PLAYER_ARROW_LIFT: f32 = 10.0;
const ENEMY_ARROW_SIZE: Vec2 = Vec2::new(8.0, 26.0);
const ENEMY_ARROW_SPEED: f32 = 350.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectileMotion {
    Linear,
    Spinning { degrees_per_second: f32 },
    /// Flies up, reflects once off the top edge and comes back faster.
    Bounce { boost: f32, bounced: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileSpec {
    pub firer: Option<EntityId>,
    pub hostile: bool,
    pub position: Vec2,
    pub size: Vec2,
    pub velocity: Vec2,
    pub rotation_degrees: f32,
    pub motion: ProjectileMotion,
    pub damage: u32,
    pub ttl: f32,
    pub hitbox_modifier: f32,
    pub texture: String,
}

impl ProjectileSpec {
    pub fn hostile(
        firer: EntityId,
        texture: &str,
        position: Vec2,
        size: Vec2,
        velocity: Vec2,
    ) -> Self {
        Self {
            firer: Some(firer),
            hostile: true,
            position,
            size,
            velocity,
            rotation_degrees: 0.0,
            motion: ProjectileMotion::Linear,
            damage: 1,
            ttl: DEFAULT_PROJECTILE_TTL,
            hitbox_modifier: 1.0,
            texture: texture.to_string(),
        }
    }

    pub fn with_motion(mut self, motion: ProjectileMotion) -> Self {
        self.motion = motion;
        self
    }

    pub fn with_rotation(mut self, rotation_degrees: f32) -> Self {
        self.rotation_degrees = rotation_degrees;
        self
    }

    pub fn with_hitbox_modifier(mut self, hitbox_modifier: f32) -> Self {
        self.hitbox_modifier = hitbox_modifier;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileState {
    pub velocity: Vec2,
    pub motion: ProjectileMotion,
    pub damage: u32,
    pub ttl: f32,
    pub hits: u32,
    firer: Option<EntityId>,
}

impl ProjectileState {
    pub fn firer(&self) -> Option<EntityId> {
        self.firer
    }

    /// A projectile only deals damage on its first hit.
    pub fn is_spent(&self) -> bool {
        self.hits > 0
    }

    pub(crate) fn live_damage(&self) -> u32 {
        if self.is_spent() {
            0
        } else {
            self.damage
        }
    }
}

pub(super) fn desc(spec: ProjectileSpec) -> EntityDesc {
    let (layer, mask) = if spec.hostile {
        (
            CollisionLayer::HostileProjectile,
            LayerMask::of(&[CollisionLayer::Player]),
        )
    } else {
        (
            CollisionLayer::PlayerProjectile,
            LayerMask::of(&[CollisionLayer::Enemy, CollisionLayer::Boss]),
        )
    };
    EntityDesc {
        kind: EntityKind::Projectile(ProjectileState {
            velocity: spec.velocity,
            motion: spec.motion,
            damage: spec.damage,
            ttl: spec.ttl,
            hits: 0,
            firer: spec.firer,
        }),
        transform: Transform::new(spec.position, spec.size).with_rotation(spec.rotation_degrees),
        texture: Some(TextureDesc::new(spec.texture, PROJECTILE_LAYER)),
        collision: Some(
            Collision2D::new(layer, mask, respond).with_hitbox_modifier(spec.hitbox_modifier),
        ),
        input: false,
    }
}

/// Upward arrow centered on the shooter, starting just above its top edge.
pub(super) fn player_arrow(firer: EntityId, shooter: &Transform) -> ProjectileSpec {
    let extent = shooter.extent();
    let position = Vec2::new(
        shooter.position.x + (extent.x - PLAYER_ARROW_SIZE.x) * 0.5,
        shooter.position.y - PLAYER_ARROW_LIFT,
    );
    ProjectileSpec {
        firer: Some(firer),
        hostile: false,
        position,
        size: PLAYER_ARROW_SIZE,
        velocity: Vec2::new(0.0, -PLAYER_ARROW_SPEED),
        rotation_degrees: 0.0,
        motion: ProjectileMotion::Linear,
        damage: 1,
        ttl: DEFAULT_PROJECTILE_TTL,
        hitbox_modifier: 1.0,
        texture: ARROW_TEXTURE.to_string(),
    }
}

/// Downward arrow from the shooter's bottom edge.
pub(super) fn enemy_arrow(firer: EntityId, shooter: &Transform) -> ProjectileSpec {
    let extent = shooter.extent();
    let position = Vec2::new(
        shooter.position.x + (extent.x - ENEMY_ARROW_SIZE.x) * 0.5,
        shooter.position.y + extent.y,
    );
    ProjectileSpec::hostile(
        firer,
        ARROW_TEXTURE,
        position,
        ENEMY_ARROW_SIZE,
        Vec2::new(0.0, ENEMY_ARROW_SPEED),
    )
    .with_rotation(180.0)
}

pub(super) fn update(
    state: &mut ProjectileState,
    body: &mut Body<'_>,
    ctx: &mut UpdateContext<'_>,
) {
    let Some(transform) = body.components.transform_mut() else {
        body.request_destroy();
        return;
    };

    transform.position += state.velocity * ctx.dt;
    match &mut state.motion {
        ProjectileMotion::Linear => {}
        ProjectileMotion::Spinning { degrees_per_second } => {
            transform.rotation_degrees =
                (transform.rotation_degrees + *degrees_per_second * ctx.dt).rem_euclid(360.0);
        }
        ProjectileMotion::Bounce { boost, bounced } => {
            if !*bounced && state.velocity.y < 0.0 && transform.position.y <= 0.0 {
                transform.position.y = 0.0;
                state.velocity = Vec2::new(state.velocity.x, -state.velocity.y) * *boost;
                transform.rotation_degrees = 0.0;
                *bounced = true;
            }
        }
    }

    let extent = transform.extent();
    let above = transform.position.y + extent.y < 0.0;
    let below = transform.position.y > ctx.world_size.y;
    let beside = transform.position.x + extent.x < 0.0 || transform.position.x > ctx.world_size.x;

    state.ttl -= ctx.dt;
    if state.ttl <= 0.0 || above || below || beside {
        body.request_destroy();
    }
}

fn respond(
    entity: &mut Entity,
    peer: &CollisionPeer,
    _commands: &mut CommandQueue,
) -> Result<(), ResponseError> {
    let id = entity.id();
    let EntityKind::Projectile(state) = entity.kind_mut() else {
        return Err(ResponseError::KindMismatch {
            id,
            expected: EntityKindTag::Projectile,
        });
    };
    if peer.kind == EntityKindTag::Projectile {
        return Ok(());
    }
    state.hits = state.hits.saturating_add(1);
    entity.request_destroy();
    Ok(())
}
