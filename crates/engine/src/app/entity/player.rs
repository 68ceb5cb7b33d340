use super::{
    projectile, Body, CollisionPeer, CommandQueue, Entity, EntityDesc, EntityKind, EntityKindTag,
    SceneEvent, TextureDesc, UpdateContext,
};
use crate::app::collision::ResponseError;
use crate::app::{Collision2D, CollisionLayer, LayerMask, Transform, Vec2};

pub const PLAYER_TEXTURE: &str = "textures/main_character.png";
pub const PLAYER_SIZE: Vec2 = Vec2::new(100.0, 160.0);
pub const PLAYER_SPEED: f32 = 400.0;
const PLAYER_HITBOX: f32 = 0.5;
const PLAYER_LAYER: i32 = 30;
const PLAYER_MAX_HEALTH: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub speed: f32,
    pub health: u32,
    pub max_health: u32,
    pub hits_taken: u32,
    pub shots_fired: u32,
    defeated: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::new(PLAYER_MAX_HEALTH)
    }
}

impl PlayerState {
    pub fn new(max_health: u32) -> Self {
        let max_health = max_health.max(1);
        Self {
            speed: PLAYER_SPEED,
            health: max_health,
            max_health,
            hits_taken: 0,
            shots_fired: 0,
            defeated: false,
        }
    }

    pub fn is_defeated(&self) -> bool {
        self.defeated
    }
}

pub(super) fn desc(position: Vec2) -> EntityDesc {
    EntityDesc {
        kind: EntityKind::Player(PlayerState::default()),
        transform: Transform::new(position, PLAYER_SIZE),
        texture: Some(TextureDesc::new(PLAYER_TEXTURE, PLAYER_LAYER)),
        collision: Some(
            Collision2D::new(
                CollisionLayer::Player,
                LayerMask::of(&[CollisionLayer::HostileProjectile]),
                respond,
            )
            .with_hitbox_modifier(PLAYER_HITBOX),
        ),
        input: true,
    }
}

pub(super) fn update(state: &mut PlayerState, body: &mut Body<'_>, ctx: &mut UpdateContext<'_>) {
    if state.defeated {
        return;
    }
    let Some(intent) = body.components.input().copied() else {
        return;
    };
    let Some(transform) = body.components.transform_mut() else {
        return;
    };

    transform.position.x += intent.movement.x * state.speed * ctx.dt;
    transform.clamp_within(ctx.world_size);
    let origin = *transform;

    if intent.fire_pressed {
        ctx.spawn(EntityDesc::projectile(projectile::player_arrow(
            body.id, &origin,
        )));
        state.shots_fired = state.shots_fired.saturating_add(1);
    }
}

fn respond(
    entity: &mut Entity,
    peer: &CollisionPeer,
    commands: &mut CommandQueue,
) -> Result<(), ResponseError> {
    let id = entity.id();
    let EntityKind::Player(state) = entity.kind_mut() else {
        return Err(ResponseError::KindMismatch {
            id,
            expected: EntityKindTag::Player,
        });
    };
    if peer.damage == 0 || state.defeated {
        return Ok(());
    }

    state.hits_taken = state.hits_taken.saturating_add(1);
    state.health = state.health.saturating_sub(peer.damage);
    if state.health == 0 {
        state.defeated = true;
        commands.emit(SceneEvent::PlayerDefeated { player: id });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::entity::EntityId;
    use crate::app::testing::builtin_resources;
    use crate::app::{InputAction, InputSnapshot, Scene};

    fn scene_with_player() -> (Scene, crate::app::ResourceManager, EntityId) {
        let (mut resources, _store) = builtin_resources();
        let mut scene = Scene::new("test", Vec2::new(1920.0, 1080.0), 7);
        let id = scene
            .spawn(EntityDesc::player(Vec2::new(900.0, 900.0)), &mut resources)
            .expect("spawn player");
        scene.apply_pending_adds();
        (scene, resources, id)
    }

    #[test]
    fn moves_horizontally_at_configured_speed() {
        let (mut scene, mut resources, id) = scene_with_player();
        let input = InputSnapshot::empty().with_action_down(InputAction::MoveRight, true);

        scene.update(0.5, &input, &mut resources);

        let x = scene.entity(id).expect("player").transform().expect("t").position.x;
        assert!((x - 1100.0).abs() < 0.001);
    }

    #[test]
    fn stays_inside_world_bounds() {
        let (mut scene, mut resources, id) = scene_with_player();
        let input = InputSnapshot::empty().with_action_down(InputAction::MoveLeft, true);

        scene.update(10.0, &input, &mut resources);

        let x = scene.entity(id).expect("player").transform().expect("t").position.x;
        assert_eq!(x, 0.0);
    }

    #[test]
    fn fire_press_spawns_one_arrow_next_frame() {
        let (mut scene, mut resources, id) = scene_with_player();
        let fire = InputSnapshot::empty().with_action_pressed(InputAction::Fire);

        scene.update(1.0 / 60.0, &fire, &mut resources);
        assert_eq!(scene.entity_count(), 1);
        assert_eq!(scene.pending_add_count(), 1);

        scene.update(1.0 / 60.0, &InputSnapshot::empty(), &mut resources);
        assert_eq!(scene.count_kind(EntityKindTag::Projectile), 1);
        let arrow = scene
            .entities()
            .iter()
            .find_map(|entity| entity.as_projectile())
            .expect("arrow");
        assert_eq!(arrow.firer(), Some(id));
        assert!(arrow.velocity.y < 0.0);
    }

    #[test]
    fn held_fire_without_new_press_does_not_spawn() {
        let (mut scene, mut resources, _id) = scene_with_player();
        let held = InputSnapshot::empty().with_action_down(InputAction::Fire, true);

        scene.update(1.0 / 60.0, &held, &mut resources);
        scene.update(1.0 / 60.0, &held, &mut resources);

        assert_eq!(scene.count_kind(EntityKindTag::Projectile), 0);
    }
}
