use super::collision::{CollisionPeer, ResponseError};
use super::resources::report_stale_handle;
use super::scene::CommandQueue;
use super::{
    Aabb, Entity, EntityId, InputAction, InputSnapshot, LoadError, RenderTarget, ResourceHandle,
    ResourceManager, SourceRect, TextureDraw, Vec2,
};

pub const COMPONENT_KIND_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Transform,
    Texture,
    Input,
    Collision2D,
}

impl ComponentKind {
    const fn index(self) -> usize {
        match self {
            ComponentKind::Transform => 0,
            ComponentKind::Texture => 1,
            ComponentKind::Input => 2,
            ComponentKind::Collision2D => 3,
        }
    }
}

/// Top-left positioned rectangle in world pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec2,
    pub size: Vec2,
    pub rotation_degrees: f32,
    pub scale: f32,
}

impl Transform {
    pub fn new(position: Vec2, size: Vec2) -> Self {
        Self {
            position,
            size,
            rotation_degrees: 0.0,
            scale: 1.0,
        }
    }

    pub fn with_rotation(mut self, rotation_degrees: f32) -> Self {
        self.rotation_degrees = rotation_degrees;
        self
    }

    pub fn extent(&self) -> Vec2 {
        self.size * self.scale
    }

    pub fn rect(&self) -> Aabb {
        Aabb::from_rect(self.position, self.extent())
    }

    pub fn center(&self) -> Vec2 {
        self.rect().center()
    }

    pub fn clamp_within(&mut self, world_size: Vec2) {
        let extent = self.extent();
        self.position.x = self.position.x.clamp(0.0, (world_size.x - extent.x).max(0.0));
        self.position.y = self.position.y.clamp(0.0, (world_size.y - extent.y).max(0.0));
    }
}

/// Drawable reference into the resource cache. Owns one cache reference until released.
#[derive(Debug, PartialEq)]
pub struct Texture {
    key: String,
    handle: ResourceHandle,
    pub source: Option<SourceRect>,
    pub layer: i32,
}

impl Texture {
    pub fn acquire(
        key: &str,
        layer: i32,
        resources: &mut ResourceManager,
    ) -> Result<Self, LoadError> {
        let handle = resources.acquire_texture(key)?;
        Ok(Self {
            key: key.to_string(),
            handle,
            source: None,
            layer,
        })
    }

    pub fn with_source(mut self, source: Option<SourceRect>) -> Self {
        self.source = source;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    pub fn release(self, resources: &mut ResourceManager) {
        if let Err(error) = resources.release(self.handle) {
            report_stale_handle(&error, "texture_release");
        }
    }

    pub fn draw(
        &self,
        dest: &Transform,
        resources: &ResourceManager,
        target: &mut dyn RenderTarget,
    ) {
        match resources.get(self.handle) {
            Ok(asset) => {
                if let Some(texture) = asset.as_texture() {
                    target.draw_texture(&TextureDraw {
                        handle: self.handle,
                        texture,
                        source: self.source,
                        dest: *dest,
                        layer: self.layer,
                    });
                }
            }
            Err(error) => report_stale_handle(&error, "texture_draw"),
        }
    }
}

/// Per-tick intent written from the input snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputIntent {
    pub movement: Vec2,
    pub fire_pressed: bool,
    pub fire_held: bool,
}

impl InputIntent {
    pub fn sample(&mut self, snapshot: &InputSnapshot) {
        self.movement = snapshot.movement_axis();
        self.fire_pressed = snapshot.was_pressed(InputAction::Fire);
        self.fire_held = snapshot.is_down(InputAction::Fire);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionLayer {
    Player,
    Enemy,
    Boss,
    PlayerProjectile,
    HostileProjectile,
}

impl CollisionLayer {
    const fn bit(self) -> u32 {
        match self {
            CollisionLayer::Player => 1 << 0,
            CollisionLayer::Enemy => 1 << 1,
            CollisionLayer::Boss => 1 << 2,
            CollisionLayer::PlayerProjectile => 1 << 3,
            CollisionLayer::HostileProjectile => 1 << 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerMask(u32);

impl LayerMask {
    pub const NONE: LayerMask = LayerMask(0);

    pub const fn of(layers: &[CollisionLayer]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < layers.len() {
            bits |= layers[index].bit();
            index += 1;
        }
        LayerMask(bits)
    }

    pub const fn contains(self, layer: CollisionLayer) -> bool {
        self.0 & layer.bit() != 0
    }
}

pub type CollisionResponse =
    fn(&mut Entity, &CollisionPeer, &mut CommandQueue) -> Result<(), ResponseError>;

#[derive(Debug, Clone, Copy)]
pub struct Collision2D {
    pub layer: CollisionLayer,
    pub mask: LayerMask,
    hitbox_modifier: Vec2,
    bounds: Aabb,
    response: CollisionResponse,
}

impl Collision2D {
    pub fn new(layer: CollisionLayer, mask: LayerMask, response: CollisionResponse) -> Self {
        Self {
            layer,
            mask,
            hitbox_modifier: Vec2::new(1.0, 1.0),
            bounds: Aabb::default(),
            response,
        }
    }

    /// Shrinks (or grows) the hitbox relative to the transform, keeping it centered.
    pub fn with_hitbox_modifier(mut self, factor: f32) -> Self {
        let factor = if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            1.0
        };
        self.hitbox_modifier = Vec2::new(factor, factor);
        self
    }

    pub fn hitbox_modifier(&self) -> Vec2 {
        self.hitbox_modifier
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn response(&self) -> CollisionResponse {
        self.response
    }

    pub fn sync(&mut self, transform: &Transform) {
        self.bounds = transform
            .rect()
            .scaled_about_center(self.hitbox_modifier);
    }

    /// Pairs are tested when either side is interested in the other.
    pub fn accepts(&self, other: &Collision2D) -> bool {
        self.mask.contains(other.layer) || other.mask.contains(self.layer)
    }
}

/// What a component sees of its owner during the update hook.
#[derive(Debug, Clone, Copy)]
pub struct OwnerContext<'a> {
    pub id: EntityId,
    pub dt: f32,
    pub transform: Option<Transform>,
    pub input: &'a InputSnapshot,
}

#[derive(Debug)]
pub enum Component {
    Transform(Transform),
    Texture(Texture),
    Input(InputIntent),
    Collision2D(Collision2D),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Transform(_) => ComponentKind::Transform,
            Component::Texture(_) => ComponentKind::Texture,
            Component::Input(_) => ComponentKind::Input,
            Component::Collision2D(_) => ComponentKind::Collision2D,
        }
    }

    pub fn update(&mut self, owner: &OwnerContext<'_>) {
        match self {
            Component::Input(intent) => intent.sample(owner.input),
            Component::Collision2D(collision) => {
                if let Some(transform) = owner.transform {
                    collision.sync(&transform);
                }
            }
            Component::Transform(_) | Component::Texture(_) => {}
        }
    }

    pub fn draw(
        &self,
        owner_transform: Option<&Transform>,
        resources: &ResourceManager,
        target: &mut dyn RenderTarget,
    ) {
        if let (Component::Texture(texture), Some(transform)) = (self, owner_transform) {
            texture.draw(transform, resources, target);
        }
    }
}

/// At most one component per kind, looked up by kind in constant time.
#[derive(Debug)]
pub struct ComponentTable {
    slots: [Option<Component>; COMPONENT_KIND_COUNT],
}

impl Default for ComponentTable {
    fn default() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }
}

impl ComponentTable {
    pub(crate) fn with(mut self, component: Component) -> Self {
        self.insert(component);
        self
    }

    /// Replaces any component of the same kind, returning the old one.
    /// A returned texture still holds its cache reference.
    pub(crate) fn insert(&mut self, component: Component) -> Option<Component> {
        let index = component.kind().index();
        self.slots[index].replace(component)
    }

    /// Replaces any component of the same kind. A replaced texture is released.
    pub fn replace(&mut self, component: Component, resources: &mut ResourceManager) {
        if let Some(Component::Texture(old)) = self.insert(component) {
            old.release(resources);
        }
    }

    pub fn remove(&mut self, kind: ComponentKind) -> Option<Component> {
        self.slots[kind.index()].take()
    }

    pub fn get(&self, kind: ComponentKind) -> Option<&Component> {
        self.slots[kind.index()].as_ref()
    }

    pub fn contains(&self, kind: ComponentKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn transform(&self) -> Option<&Transform> {
        match self.get(ComponentKind::Transform) {
            Some(Component::Transform(transform)) => Some(transform),
            _ => None,
        }
    }

    pub fn transform_mut(&mut self) -> Option<&mut Transform> {
        match self.slots[ComponentKind::Transform.index()].as_mut() {
            Some(Component::Transform(transform)) => Some(transform),
            _ => None,
        }
    }

    pub fn texture(&self) -> Option<&Texture> {
        match self.get(ComponentKind::Texture) {
            Some(Component::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    pub fn input(&self) -> Option<&InputIntent> {
        match self.get(ComponentKind::Input) {
            Some(Component::Input(intent)) => Some(intent),
            _ => None,
        }
    }

    pub fn collision(&self) -> Option<&Collision2D> {
        match self.get(ComponentKind::Collision2D) {
            Some(Component::Collision2D(collision)) => Some(collision),
            _ => None,
        }
    }

    pub fn collision_mut(&mut self) -> Option<&mut Collision2D> {
        match self.slots[ComponentKind::Collision2D.index()].as_mut() {
            Some(Component::Collision2D(collision)) => Some(collision),
            _ => None,
        }
    }

    pub(crate) fn update_all(&mut self, owner: &OwnerContext<'_>) {
        for component in self.slots.iter_mut().flatten() {
            component.update(owner);
        }
    }

    pub(crate) fn sync_collision(&mut self) {
        let Some(transform) = self.transform().copied() else {
            return;
        };
        if let Some(collision) = self.collision_mut() {
            collision.sync(&transform);
        }
    }

    pub fn draw(&self, resources: &ResourceManager, target: &mut dyn RenderTarget) {
        let transform = self.transform();
        for component in self.slots.iter().flatten() {
            component.draw(transform, resources, target);
        }
    }

    pub(crate) fn release_resources(&mut self, resources: &mut ResourceManager) {
        if let Some(Component::Texture(texture)) = self.remove(ComponentKind::Texture) {
            texture.release(resources);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::collision::CollisionPeer;
    use crate::app::testing::{MemoryAssetStore, RecordingTarget};

    fn ignore_response(
        _entity: &mut Entity,
        _peer: &CollisionPeer,
        _commands: &mut CommandQueue,
    ) -> Result<(), ResponseError> {
        Ok(())
    }

    #[test]
    fn table_holds_one_component_per_kind() {
        let mut table = ComponentTable::default();
        table.insert(Component::Input(InputIntent::default()));
        let replaced = table.insert(Component::Input(InputIntent {
            fire_pressed: true,
            ..InputIntent::default()
        }));

        assert!(replaced.is_some());
        assert_eq!(table.len(), 1);
        assert!(table.input().expect("input").fire_pressed);
        assert!(!table.contains(ComponentKind::Transform));
    }

    #[test]
    fn remove_clears_only_that_kind() {
        let mut table = ComponentTable::default()
            .with(Component::Transform(Transform::new(
                Vec2::ZERO,
                Vec2::new(10.0, 10.0),
            )))
            .with(Component::Input(InputIntent::default()));

        assert!(table.remove(ComponentKind::Input).is_some());
        assert!(table.remove(ComponentKind::Input).is_none());
        assert!(table.transform().is_some());
    }

    #[test]
    fn collision_bounds_follow_transform_with_centered_hitbox() {
        let transform = Transform::new(Vec2::new(100.0, 100.0), Vec2::new(100.0, 160.0));
        let mut table = ComponentTable::default()
            .with(Component::Transform(transform))
            .with(Component::Collision2D(
                Collision2D::new(
                    CollisionLayer::Player,
                    LayerMask::of(&[CollisionLayer::HostileProjectile]),
                    ignore_response,
                )
                .with_hitbox_modifier(0.5),
            ));

        table.sync_collision();
        let bounds = table.collision().expect("collision").bounds();
        assert_eq!(bounds.center(), transform.center());
        assert!((bounds.width() - 50.0).abs() < 0.0001);

        table.transform_mut().expect("transform").position.x += 40.0;
        table.sync_collision();
        let moved = table.collision().expect("collision").bounds();
        assert!((moved.min.x - 165.0).abs() < 0.0001);
    }

    #[test]
    fn input_component_samples_snapshot_on_update() {
        let snapshot = InputSnapshot::empty()
            .with_action_down(InputAction::MoveRight, true)
            .with_action_pressed(InputAction::Fire);
        let mut table = ComponentTable::default().with(Component::Input(InputIntent::default()));

        table.update_all(&OwnerContext {
            id: EntityId(1),
            dt: 1.0 / 60.0,
            transform: None,
            input: &snapshot,
        });

        let intent = table.input().expect("input");
        assert_eq!(intent.movement.x, 1.0);
        assert!(intent.fire_pressed);
    }

    #[test]
    fn mask_is_checked_in_either_direction() {
        let watcher = Collision2D::new(
            CollisionLayer::Player,
            LayerMask::of(&[CollisionLayer::HostileProjectile]),
            ignore_response,
        );
        let passive = Collision2D::new(
            CollisionLayer::HostileProjectile,
            LayerMask::NONE,
            ignore_response,
        );
        let unrelated = Collision2D::new(CollisionLayer::Enemy, LayerMask::NONE, ignore_response);

        assert!(watcher.accepts(&passive));
        assert!(passive.accepts(&watcher));
        assert!(!watcher.accepts(&unrelated));
    }

    #[test]
    fn texture_draw_uses_owner_transform_and_layer() {
        let mut store = MemoryAssetStore::default();
        store.insert_texture("textures/arrow.png", 4, 4);
        let mut resources = ResourceManager::new(Box::new(store));
        let texture = Texture::acquire("textures/arrow.png", 7, &mut resources).expect("texture");
        let transform = Transform::new(Vec2::new(3.0, 4.0), Vec2::new(15.0, 40.0));
        let table = ComponentTable::default()
            .with(Component::Transform(transform))
            .with(Component::Texture(texture));
        let mut target = RecordingTarget::default();

        table.draw(&resources, &mut target);

        assert_eq!(target.draws.len(), 1);
        assert_eq!(target.draws[0].layer, 7);
        assert_eq!(target.draws[0].position, Vec2::new(3.0, 4.0));
    }

    #[test]
    fn releasing_resources_drops_texture_reference() {
        let mut store = MemoryAssetStore::default();
        store.insert_texture("textures/arrow.png", 4, 4);
        let mut resources = ResourceManager::new(Box::new(store));
        let texture = Texture::acquire("textures/arrow.png", 0, &mut resources).expect("texture");
        let mut table = ComponentTable::default().with(Component::Texture(texture));

        table.release_resources(&mut resources);

        assert!(table.texture().is_none());
        assert_eq!(resources.refcount("textures/arrow.png"), 0);
    }

    #[test]
    fn replacing_texture_releases_the_old_reference() {
        let mut store = MemoryAssetStore::default();
        store.insert_texture("textures/arrow.png", 4, 4);
        store.insert_texture("textures/enemy.png", 8, 8);
        let mut resources = ResourceManager::new(Box::new(store));
        let arrow = Texture::acquire("textures/arrow.png", 0, &mut resources).expect("arrow");
        let enemy = Texture::acquire("textures/enemy.png", 0, &mut resources).expect("enemy");
        let mut table = ComponentTable::default().with(Component::Texture(arrow));

        table.replace(Component::Texture(enemy), &mut resources);

        assert_eq!(resources.refcount("textures/arrow.png"), 0);
        assert_eq!(resources.refcount("textures/enemy.png"), 1);
        assert_eq!(table.texture().expect("texture").key(), "textures/enemy.png");
    }
}
