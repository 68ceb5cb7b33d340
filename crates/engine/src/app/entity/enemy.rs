use rand::Rng;

use super::{
    projectile, Body, CollisionPeer, CommandQueue, Entity, EntityDesc, EntityKind, EntityKindTag,
    SceneEvent, TextureDesc, UpdateContext,
};
use crate::app::collision::ResponseError;
use crate::app::{Collision2D, CollisionLayer, LayerMask, Transform, Vec2};

pub const ENEMY_TEXTURE: &str = "textures/undead_archer.png";
pub const ENEMY_SIZE: Vec2 = Vec2::new(70.0, 70.0);
const ENEMY_LAYER: i32 = 10;
const ENEMY_SPEED: f32 = 100.0;
const ENEMY_HEALTH: u32 = 1;
const AGGRO_RANGE: f32 = 900.0;
const ATTACK_RANGE: f32 = 450.0;
const LOSE_INTEREST_FACTOR: f32 = 1.25;
const SWAY_AMPLITUDE: f32 = 60.0;
const SWAY_RATE: f32 = 1.5;
const LEASH: f32 = 120.0;
const FIRE_INTERVAL_MIN: f32 = 2.0;
const FIRE_INTERVAL_MAX: f32 = 5.0;
const FORMATION_COLUMNS: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnemyMode {
    Idle,
    Chase,
    Attack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnemyState {
    pub health: u32,
    pub speed: f32,
    mode: EnemyMode,
    anchor: Vec2,
    sway_phase: f32,
    fire_cooldown: Option<f32>,
    shots_fired: u32,
}

impl EnemyState {
    pub fn new(anchor: Vec2) -> Self {
        Self {
            health: ENEMY_HEALTH,
            speed: ENEMY_SPEED,
            mode: EnemyMode::Idle,
            anchor,
            sway_phase: 0.0,
            fire_cooldown: None,
            shots_fired: 0,
        }
    }

    pub fn mode(&self) -> EnemyMode {
        self.mode
    }

    pub fn shots_fired(&self) -> u32 {
        self.shots_fired
    }
}

pub(super) fn desc(position: Vec2) -> EntityDesc {
    EntityDesc {
        kind: EntityKind::Enemy(EnemyState::new(position)),
        transform: Transform::new(position, ENEMY_SIZE),
        texture: Some(TextureDesc::new(ENEMY_TEXTURE, ENEMY_LAYER)),
        collision: Some(Collision2D::new(
            CollisionLayer::Enemy,
            LayerMask::of(&[CollisionLayer::PlayerProjectile]),
            respond,
        )),
        input: false,
    }
}

/// Grid of spawn positions, filled row by row from the top of the world.
pub fn formation(count: usize, world_size: Vec2) -> Vec<Vec2> {
    let spacing_x = world_size.x / (FORMATION_COLUMNS as f32 + 2.0);
    let spacing_y = world_size.y / 6.0;
    (0..count)
        .map(|index| {
            let row = index / FORMATION_COLUMNS;
            let column = index % FORMATION_COLUMNS;
            Vec2::new(
                spacing_x * (column as f32 + 1.0),
                spacing_y * row as f32,
            )
        })
        .collect()
}

pub(crate) fn next_mode(current: EnemyMode, distance_to_player: Option<f32>) -> EnemyMode {
    let Some(distance) = distance_to_player else {
        return EnemyMode::Idle;
    };
    match current {
        EnemyMode::Idle if distance <= AGGRO_RANGE => EnemyMode::Chase,
        EnemyMode::Idle => EnemyMode::Idle,
        EnemyMode::Chase if distance > AGGRO_RANGE * LOSE_INTEREST_FACTOR => EnemyMode::Idle,
        EnemyMode::Chase if distance <= ATTACK_RANGE => EnemyMode::Attack,
        EnemyMode::Chase => EnemyMode::Chase,
        EnemyMode::Attack if distance > ATTACK_RANGE => EnemyMode::Chase,
        EnemyMode::Attack => EnemyMode::Attack,
    }
}

fn step_toward(current: f32, target: f32, max_step: f32) -> f32 {
    let delta = target - current;
    if delta.abs() <= max_step {
        target
    } else {
        current + max_step * delta.signum()
    }
}

pub(super) fn update(state: &mut EnemyState, body: &mut Body<'_>, ctx: &mut UpdateContext<'_>) {
    let Some(transform) = body.components.transform_mut() else {
        return;
    };
    let center = transform.center();
    let distance = ctx.player.map(|player| (player.center.x - center.x).abs());
    state.mode = next_mode(state.mode, distance);

    let cooldown = state
        .fire_cooldown
        .get_or_insert_with(|| ctx.rng.gen_range(FIRE_INTERVAL_MIN..FIRE_INTERVAL_MAX));
    *cooldown -= ctx.dt;

    let max_step = state.speed * ctx.dt;
    let half_width = transform.extent().x * 0.5;
    match state.mode {
        EnemyMode::Idle => {
            state.sway_phase += ctx.dt * SWAY_RATE;
            let target = state.anchor.x + state.sway_phase.sin() * SWAY_AMPLITUDE;
            transform.position.x = step_toward(transform.position.x, target, max_step);
        }
        EnemyMode::Chase | EnemyMode::Attack => {
            if let Some(player) = ctx.player {
                let target = (player.center.x - half_width)
                    .clamp(state.anchor.x - LEASH, state.anchor.x + LEASH);
                transform.position.x = step_toward(transform.position.x, target, max_step);
            }
        }
    }
    transform.clamp_within(ctx.world_size);
    let origin = *transform;

    if state.mode == EnemyMode::Attack && *cooldown <= 0.0 {
        *cooldown = ctx.rng.gen_range(FIRE_INTERVAL_MIN..FIRE_INTERVAL_MAX);
        state.shots_fired = state.shots_fired.saturating_add(1);
        ctx.spawn(EntityDesc::projectile(projectile::enemy_arrow(
            body.id, &origin,
        )));
    }
}

fn respond(
    entity: &mut Entity,
    peer: &CollisionPeer,
    commands: &mut CommandQueue,
) -> Result<(), ResponseError> {
    let id = entity.id();
    let EntityKind::Enemy(state) = entity.kind_mut() else {
        return Err(ResponseError::KindMismatch {
            id,
            expected: EntityKindTag::Enemy,
        });
    };
    if peer.damage == 0 || state.health == 0 {
        return Ok(());
    }

    state.health = state.health.saturating_sub(peer.damage);
    let defeated = state.health == 0;
    commands.emit(SceneEvent::TargetHit {
        target: id,
        kind: EntityKindTag::Enemy,
    });
    if defeated {
        entity.request_destroy();
        commands.emit(SceneEvent::EnemyDefeated { enemy: id });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::builtin_resources;
    use crate::app::{InputSnapshot, Scene};

    #[test]
    fn mode_transitions_follow_distance() {
        assert_eq!(next_mode(EnemyMode::Idle, None), EnemyMode::Idle);
        assert_eq!(next_mode(EnemyMode::Idle, Some(2000.0)), EnemyMode::Idle);
        assert_eq!(next_mode(EnemyMode::Idle, Some(800.0)), EnemyMode::Chase);
        assert_eq!(next_mode(EnemyMode::Chase, Some(400.0)), EnemyMode::Attack);
        assert_eq!(next_mode(EnemyMode::Attack, Some(500.0)), EnemyMode::Chase);
        assert_eq!(next_mode(EnemyMode::Chase, Some(1000.0)), EnemyMode::Chase);
        assert_eq!(next_mode(EnemyMode::Chase, Some(1200.0)), EnemyMode::Idle);
        assert_eq!(next_mode(EnemyMode::Attack, None), EnemyMode::Idle);
    }

    #[test]
    fn formation_fills_rows_of_eighteen() {
        let world = Vec2::new(1920.0, 1080.0);
        let positions = formation(20, world);

        assert_eq!(positions.len(), 20);
        assert_eq!(positions[0].y, 0.0);
        assert_eq!(positions[17].y, 0.0);
        assert!((positions[18].y - 180.0).abs() < 0.001);
        assert_eq!(positions[18].x, positions[0].x);
    }

    #[test]
    fn enemy_in_range_of_player_fires_downward_arrows() {
        let (mut resources, _store) = builtin_resources();
        let mut scene = Scene::new("test", Vec2::new(1920.0, 1080.0), 3);
        scene
            .spawn(EntityDesc::player(Vec2::new(1300.0, 900.0)), &mut resources)
            .expect("player");
        let enemy = scene
            .spawn(EntityDesc::enemy(Vec2::new(900.0, 100.0)), &mut resources)
            .expect("enemy");
        scene.apply_pending_adds();

        for _ in 0..(60 * 12) {
            scene.update(1.0 / 60.0, &InputSnapshot::empty(), &mut resources);
            scene.collision_pass();
            scene.apply_pending_removals(&mut resources);
        }

        let entity = scene.entity(enemy).expect("enemy");
        let state = entity.as_enemy().expect("state");
        assert_eq!(state.mode(), EnemyMode::Attack);
        let x = entity.transform().expect("t").position.x;
        assert!(x <= 900.0 + LEASH + 0.001);
        assert!(state.shots_fired() >= 2);
    }

    #[test]
    fn idle_enemy_stays_near_anchor() {
        let (mut resources, _store) = builtin_resources();
        let mut scene = Scene::new("test", Vec2::new(1920.0, 1080.0), 3);
        let enemy = scene
            .spawn(EntityDesc::enemy(Vec2::new(500.0, 100.0)), &mut resources)
            .expect("enemy");
        scene.apply_pending_adds();

        for _ in 0..600 {
            scene.update(1.0 / 60.0, &InputSnapshot::empty(), &mut resources);
        }

        let entity = scene.entity(enemy).expect("enemy");
        let x = entity.transform().expect("t").position.x;
        assert_eq!(entity.as_enemy().expect("state").mode(), EnemyMode::Idle);
        assert!((x - 500.0).abs() <= SWAY_AMPLITUDE + 0.001);
        assert_eq!(scene.count_kind(EntityKindTag::Projectile), 0);
    }
}
