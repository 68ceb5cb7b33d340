use thiserror::Error;
use tracing::warn;

use super::scene::CommandQueue;
use super::{Aabb, CollisionLayer, ComponentKind, Entity, EntityId, EntityKindTag};

/// Snapshot of the other side of a pair, taken before either response runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionPeer {
    pub id: EntityId,
    pub kind: EntityKindTag,
    pub layer: CollisionLayer,
    pub bounds: Aabb,
    pub firer: Option<EntityId>,
    /// Zero for non-projectiles and for projectiles that already hit something.
    pub damage: u32,
    pub pending_destroy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("entity {id:?} does not carry {expected:?} state")]
    KindMismatch {
        id: EntityId,
        expected: EntityKindTag,
    },
    #[error("entity {id:?} is missing its {kind:?} component")]
    MissingComponent { id: EntityId, kind: ComponentKind },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionReport {
    pub candidates: usize,
    pub tested: usize,
    /// Overlapping pairs in callback order, lower id first.
    pub responded: Vec<(EntityId, EntityId)>,
    pub failures: usize,
}

fn is_firer_of(projectile: &CollisionPeer, other: &CollisionPeer) -> bool {
    projectile.firer == Some(other.id)
}

/// Brute-force pair pass over the live set.
///
/// `entities` must be ordered by ascending id, which makes pair order (and therefore response
/// order) deterministic. Entities already flagged for destruction still take part.
pub(crate) fn run_collision_pass(
    entities: &mut [Entity],
    commands: &mut CommandQueue,
) -> CollisionReport {
    let mut report = CollisionReport::default();
    let candidates: Vec<usize> = entities
        .iter()
        .enumerate()
        .filter(|(_, entity)| entity.components().contains(ComponentKind::Collision2D))
        .map(|(index, _)| index)
        .collect();
    report.candidates = candidates.len();

    for (position, &low) in candidates.iter().enumerate() {
        for &high in &candidates[position + 1..] {
            let (Some(low_peer), Some(high_peer)) =
                (entities[low].collision_peer(), entities[high].collision_peer())
            else {
                continue;
            };
            let (Some(low_collision), Some(high_collision)) = (
                entities[low].components().collision().copied(),
                entities[high].components().collision().copied(),
            ) else {
                continue;
            };

            if !low_collision.accepts(&high_collision) {
                continue;
            }
            if is_firer_of(&low_peer, &high_peer) || is_firer_of(&high_peer, &low_peer) {
                continue;
            }
            report.tested += 1;
            if !low_peer.bounds.overlaps(&high_peer.bounds) {
                continue;
            }

            let (head, tail) = entities.split_at_mut(high);
            let low_entity = &mut head[low];
            let high_entity = &mut tail[0];
            report.responded.push((low_peer.id, high_peer.id));

            for (entity, peer, response) in [
                (low_entity, &high_peer, low_collision.response()),
                (high_entity, &low_peer, high_collision.response()),
            ] {
                if let Err(error) = response(entity, peer, commands) {
                    report.failures += 1;
                    warn!(
                        entity = entity.id().0,
                        peer = peer.id.0,
                        error = %error,
                        "collision_response_failed"
                    );
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::builtin_resources;
    use crate::app::{
        Collision2D, Component, EntityDesc, InputSnapshot, LayerMask, ProjectileSpec, Scene, Vec2,
        ARROW_TEXTURE,
    };

    fn world() -> Vec2 {
        Vec2::new(1920.0, 1080.0)
    }

    fn hostile_at(firer: EntityId, position: Vec2) -> ProjectileSpec {
        ProjectileSpec::hostile(
            firer,
            ARROW_TEXTURE,
            position,
            Vec2::new(20.0, 20.0),
            Vec2::ZERO,
        )
    }

    #[test]
    fn overlapping_player_and_hostile_projectile_respond_once_each() {
        let (mut resources, _store) = builtin_resources();
        let mut scene = Scene::new("test", world(), 1);
        let player = scene
            .spawn(EntityDesc::player(Vec2::new(500.0, 500.0)), &mut resources)
            .expect("player");
        let arrow = scene
            .spawn(
                EntityDesc::projectile(hostile_at(EntityId(900), Vec2::new(540.0, 570.0))),
                &mut resources,
            )
            .expect("arrow");
        scene.apply_pending_adds();
        assert_eq!(scene.entity_count(), 2);

        let report = scene.collision_pass().clone();
        assert_eq!(report.responded, vec![(player, arrow)]);
        assert_eq!(report.failures, 0);

        let hit = scene.entity(player).and_then(Entity::as_player).expect("player");
        assert_eq!(hit.hits_taken, 1);
        let spent = scene.entity(arrow).expect("arrow");
        assert!(spent.is_pending_destroy());
        assert_eq!(spent.as_projectile().expect("state").hits, 1);

        scene.apply_pending_removals(&mut resources);
        assert_eq!(scene.entity_count(), 1);
        assert!(scene.entity(player).is_some());
    }

    #[test]
    fn interested_pair_without_overlap_gets_no_response() {
        let (mut resources, _store) = builtin_resources();
        let mut scene = Scene::new("test", world(), 1);
        let player = scene
            .spawn(EntityDesc::player(Vec2::new(500.0, 500.0)), &mut resources)
            .expect("player");
        let arrow = scene
            .spawn(
                EntityDesc::projectile(hostile_at(EntityId(900), Vec2::new(1500.0, 100.0))),
                &mut resources,
            )
            .expect("arrow");
        scene.apply_pending_adds();

        let report = scene.collision_pass().clone();

        assert_eq!(report.tested, 1);
        assert!(report.responded.is_empty());
        let untouched = scene.entity(player).and_then(Entity::as_player).expect("player");
        assert_eq!(untouched.hits_taken, 0);
        let flying = scene.entity(arrow).expect("arrow");
        assert!(!flying.is_pending_destroy());
        assert_eq!(flying.as_projectile().expect("state").hits, 0);
    }

    #[test]
    fn masks_that_ignore_each_other_skip_the_pair() {
        let (mut resources, _store) = builtin_resources();
        let mut scene = Scene::new("test", world(), 1);
        scene
            .spawn(EntityDesc::enemy(Vec2::new(100.0, 100.0)), &mut resources)
            .expect("enemy");
        scene
            .spawn(EntityDesc::enemy(Vec2::new(110.0, 110.0)), &mut resources)
            .expect("enemy");
        scene.apply_pending_adds();

        let report = scene.collision_pass();
        assert_eq!(report.candidates, 2);
        assert_eq!(report.tested, 0);
        assert!(report.responded.is_empty());
    }

    #[test]
    fn projectile_never_hits_its_firer() {
        let (mut resources, _store) = builtin_resources();
        let mut scene = Scene::new("test", world(), 1);
        let player = scene
            .spawn(EntityDesc::player(Vec2::new(500.0, 500.0)), &mut resources)
            .expect("player");
        scene
            .spawn(
                EntityDesc::projectile(hostile_at(player, Vec2::new(540.0, 570.0))),
                &mut resources,
            )
            .expect("self shot");
        scene.apply_pending_adds();

        let report = scene.collision_pass();
        assert!(report.responded.is_empty());
        assert_eq!(report.tested, 0);
    }

    #[test]
    fn spent_projectile_does_not_damage_second_target() {
        let (mut resources, _store) = builtin_resources();
        let mut scene = Scene::new("test", world(), 1);
        let arrow = scene
            .spawn(
                EntityDesc::projectile(ProjectileSpec {
                    hostile: false,
                    ..hostile_at(EntityId(900), Vec2::new(130.0, 130.0))
                }),
                &mut resources,
            )
            .expect("arrow");
        let first = scene
            .spawn(EntityDesc::enemy(Vec2::new(100.0, 100.0)), &mut resources)
            .expect("enemy");
        let second = scene
            .spawn(EntityDesc::enemy(Vec2::new(110.0, 110.0)), &mut resources)
            .expect("enemy");
        scene.apply_pending_adds();

        let report = scene.collision_pass().clone();

        assert_eq!(report.responded, vec![(arrow, first), (arrow, second)]);
        assert!(scene.entity(first).expect("first").is_pending_destroy());
        assert!(!scene.entity(second).expect("second").is_pending_destroy());
        assert_eq!(
            scene.entity(arrow).and_then(Entity::as_projectile).expect("arrow").hits,
            2
        );
    }

    #[test]
    fn failing_response_is_isolated_to_its_pair() {
        fn broken(
            entity: &mut Entity,
            _peer: &CollisionPeer,
            _commands: &mut CommandQueue,
        ) -> Result<(), ResponseError> {
            Err(ResponseError::MissingComponent {
                id: entity.id(),
                kind: ComponentKind::Texture,
            })
        }

        let (mut resources, _store) = builtin_resources();
        let mut scene = Scene::new("test", world(), 1);
        let player = scene
            .spawn(EntityDesc::player(Vec2::new(500.0, 500.0)), &mut resources)
            .expect("player");
        let arrow = scene
            .spawn(
                EntityDesc::projectile(hostile_at(EntityId(900), Vec2::new(540.0, 570.0))),
                &mut resources,
            )
            .expect("arrow");
        scene.apply_pending_adds();
        let components = scene.entity_mut(player).expect("player").components_mut();
        components.insert(Component::Collision2D(Collision2D::new(
            CollisionLayer::Player,
            LayerMask::of(&[CollisionLayer::HostileProjectile]),
            broken,
        )));
        components.sync_collision();

        let report = scene.collision_pass().clone();

        assert_eq!(report.failures, 1);
        assert_eq!(report.responded.len(), 1);
        assert!(scene.entity(arrow).expect("arrow").is_pending_destroy());

        scene.update(1.0 / 60.0, &InputSnapshot::empty(), &mut resources);
        scene.apply_pending_removals(&mut resources);
        assert_eq!(scene.entity_count(), 1);
    }
}
