use std::rc::Rc;

use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use super::{
    enemy, Body, CollisionPeer, CommandQueue, Entity, EntityDesc, EntityId, EntityKind,
    EntityKindTag, ProjectileMotion, ProjectileSpec, SceneEvent, TextureDesc, UpdateContext,
};
use crate::app::collision::ResponseError;
use crate::app::definition::{load_definition, parse_definition, DefinitionError};
use crate::app::{Collision2D, CollisionLayer, LayerMask, ResourceManager, Transform, Vec2};

pub const BOSS_SIZE: Vec2 = Vec2::new(300.0, 300.0);
pub const BOSS_HITBOX: f32 = 1.0;
pub const ULTIMATE_COOLDOWN_SECONDS: f32 = 15.0;
pub const ULTIMATE_FIRE_PERIOD_SECONDS: f32 = 5.0;
const BOSS_LAYER: i32 = 20;
const BOSS_SPEED: f32 = 100.0;
const BOSS_PROJECTILE_HITBOX: f32 = 0.6;
const DIRECTION_CHANGE_MIN: f32 = 0.5;
const DIRECTION_CHANGE_MAX: f32 = 5.0;
const SPAWN_MARGIN: f32 = 10.0;

pub(super) const RAIN_TEXTURE: &str = "textures/evil_spikes.png";
pub(super) const SPREAD_TEXTURE: &str = "textures/soul_reaper.png";
pub(super) const GHOST_TEXTURE: &str = "textures/cursed_fire.png";
pub(super) const SLASH_TEXTURE: &str = "textures/slash.png";
pub(super) const ULTIMATE_TEXTURE: &str = "textures/fireball.png";

const RAIN_COUNT: usize = 7;
const RAIN_SPREAD: f32 = 800.0;
const RAIN_SIZE: Vec2 = Vec2::new(60.0, 60.0);
const RAIN_SPEED: f32 = 350.0;
const RAIN_BOOST: f32 = 1.5;
const SPREAD_SIZE: Vec2 = Vec2::new(100.0, 100.0);
const SPREAD_SPEED: f32 = 200.0;
const GHOST_SIZE: Vec2 = Vec2::new(80.0, 80.0);
const GHOST_SPEED: f32 = 100.0;
const SLASH_SIZE: Vec2 = Vec2::new(160.0, 120.0);
const SLASH_SPEED: f32 = 450.0;
const SLASH_SPIN: f32 = 180.0;
const ULTIMATE_SIZE: Vec2 = Vec2::new(24.0, 24.0);
const ULTIMATE_SPEED: f32 = 400.0;
const ULTIMATE_ROW_COVERAGE: f32 = 0.7;
const ULTIMATE_FIRST_DELAY: f32 = 10.0;
const ULTIMATE_BURST_INTERVAL: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirePattern {
    Rain,
    Spread,
    Ghost,
    Slash,
    Ultimate,
}

fn default_threshold() -> f32 {
    1.0
}

fn default_speed() -> f32 {
    BOSS_SPEED
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BossPhaseDef {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    pub patterns: Vec<FirePattern>,
    #[serde(default)]
    pub dialogue: Option<String>,
    #[serde(default)]
    pub summon_enemies: usize,
    #[serde(default)]
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BossMovementDef {
    pub min_x: f32,
    pub max_x: f32,
    pub vertical: bool,
    pub min_y: f32,
    pub max_y: f32,
}

impl Default for BossMovementDef {
    fn default() -> Self {
        Self {
            min_x: 400.0,
            max_x: 1500.0,
            vertical: false,
            min_y: 0.0,
            max_y: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BossDef {
    pub id: String,
    pub name: String,
    pub hp: u32,
    pub texture: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub movement: BossMovementDef,
    pub phases: Vec<BossPhaseDef>,
}

impl BossDef {
    pub fn parse(key: &str, raw: &str) -> Result<Self, DefinitionError> {
        let def: BossDef = parse_definition(key, raw)?;
        def.validate(key)?;
        Ok(def)
    }

    pub fn load(resources: &mut ResourceManager, key: &str) -> Result<Self, DefinitionError> {
        let def: BossDef = load_definition(resources, key)?;
        def.validate(key)?;
        Ok(def)
    }

    /// Phases after the first must have strictly descending thresholds in (0, 1].
    pub fn validate(&self, key: &str) -> Result<(), DefinitionError> {
        if self.hp == 0 {
            return Err(DefinitionError::invalid(key, "hp must be positive"));
        }
        if self.phases.is_empty() {
            return Err(DefinitionError::invalid(key, "at least one phase is required"));
        }
        if self.movement.min_x > self.movement.max_x || self.movement.min_y > self.movement.max_y
        {
            return Err(DefinitionError::invalid(key, "movement bounds are inverted"));
        }
        let mut previous = f32::INFINITY;
        for (index, phase) in self.phases.iter().enumerate().skip(1) {
            if !(phase.threshold > 0.0 && phase.threshold <= 1.0) {
                return Err(DefinitionError::invalid(
                    key,
                    format!("phases[{index}].threshold must be in (0, 1]"),
                ));
            }
            if phase.threshold >= previous {
                return Err(DefinitionError::invalid(
                    key,
                    format!("phases[{index}].threshold must be below the previous phase"),
                ));
            }
            previous = phase.threshold;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("boss cannot move from phase {current} to phase {requested} ({phase_count} phases)")]
pub struct InvalidPhaseTransition {
    pub current: usize,
    pub requested: usize,
    pub phase_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct PatternOrigin {
    boss: EntityId,
    rect: Transform,
    target: Option<Vec2>,
}

type PatternFn = fn(&PatternOrigin, &mut UpdateContext<'_>);

/// One fire pattern plus its cooldown clock.
#[derive(Debug, Clone, Copy)]
pub struct PatternSlot {
    pattern: FirePattern,
    cooldown: f32,
    rate: f32,
    burst_elapsed: f32,
    burst_tick: f32,
    fire: PatternFn,
}

impl PatternSlot {
    pub fn new(pattern: FirePattern) -> Self {
        let (cooldown, rate, fire): (f32, f32, PatternFn) = match pattern {
            FirePattern::Rain => (0.0, 3.0, fire_rain),
            FirePattern::Spread => (0.0, 3.0, fire_spread),
            FirePattern::Ghost => (0.0, 5.0, fire_ghost),
            FirePattern::Slash => (4.0, 7.0, fire_slash),
            FirePattern::Ultimate => (
                ULTIMATE_FIRST_DELAY,
                ULTIMATE_COOLDOWN_SECONDS,
                fire_ultimate,
            ),
        };
        Self {
            pattern,
            cooldown,
            rate,
            burst_elapsed: 0.0,
            burst_tick: 0.0,
            fire,
        }
    }

    pub fn pattern(&self) -> FirePattern {
        self.pattern
    }

    pub fn cooldown(&self) -> f32 {
        self.cooldown
    }

    fn tick(&mut self, dt: f32) -> bool {
        if self.pattern != FirePattern::Ultimate {
            self.cooldown -= dt;
            if self.cooldown <= 0.0 {
                self.cooldown = self.rate;
                return true;
            }
            return false;
        }

        if self.cooldown > 0.0 {
            self.cooldown -= dt;
            return false;
        }
        self.burst_elapsed += dt;
        if self.burst_elapsed >= ULTIMATE_FIRE_PERIOD_SECONDS {
            self.cooldown = self.rate;
            self.burst_elapsed = 0.0;
            self.burst_tick = 0.0;
            return false;
        }
        self.burst_tick -= dt;
        if self.burst_tick <= 0.0 {
            self.burst_tick = ULTIMATE_BURST_INTERVAL;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone)]
pub struct BossState {
    def: Rc<BossDef>,
    health: u32,
    phase: usize,
    pending_phase: Option<usize>,
    slots: Vec<PatternSlot>,
    speed: f32,
    direction: Vec2,
    direction_timer: f32,
}

impl BossState {
    pub fn new(def: Rc<BossDef>) -> Self {
        let mut state = Self {
            health: def.hp.max(1),
            def,
            phase: 0,
            pending_phase: None,
            slots: Vec::new(),
            speed: BOSS_SPEED,
            direction: Vec2::new(1.0, 1.0),
            direction_timer: 0.0,
        };
        state.install_phase(0);
        state
    }

    pub fn def(&self) -> &BossDef {
        &self.def
    }

    pub fn health(&self) -> u32 {
        self.health
    }

    pub fn max_health(&self) -> u32 {
        self.def.hp.max(1)
    }

    pub fn health_fraction(&self) -> f32 {
        self.health as f32 / self.max_health() as f32
    }

    pub fn is_defeated(&self) -> bool {
        self.health == 0
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    pub fn pending_phase(&self) -> Option<usize> {
        self.pending_phase
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn patterns(&self) -> impl Iterator<Item = FirePattern> + '_ {
        self.slots.iter().map(PatternSlot::pattern)
    }

    /// Deepest phase whose threshold the current health fraction has reached.
    pub fn target_phase(&self) -> usize {
        let fraction = self.health_fraction();
        self.def
            .phases
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, phase)| fraction <= phase.threshold)
            .map(|(index, _)| index)
            .last()
            .unwrap_or(0)
    }

    /// Returns true when the hit was lethal.
    pub fn apply_damage(&mut self, amount: u32) -> bool {
        self.health = self.health.saturating_sub(amount);
        self.note_health_changed();
        self.health == 0
    }

    pub fn heal(&mut self, amount: u32) {
        self.health = self.health.saturating_add(amount).min(self.max_health());
        self.note_health_changed();
    }

    /// Applies a phase. Moving backwards or past the last phase is rejected; the current phase
    /// is a no-op and yields false.
    pub fn set_phase(&mut self, requested: usize) -> Result<bool, InvalidPhaseTransition> {
        let phase_count = self.def.phases.len();
        if requested < self.phase || requested >= phase_count {
            return Err(InvalidPhaseTransition {
                current: self.phase,
                requested,
                phase_count,
            });
        }
        if requested == self.phase {
            return Ok(false);
        }
        self.install_phase(requested);
        Ok(true)
    }

    fn note_health_changed(&mut self) {
        let target = self.target_phase();
        let floor = self.pending_phase.unwrap_or(self.phase);
        if target > floor {
            self.pending_phase = Some(target);
        }
    }

    fn install_phase(&mut self, index: usize) {
        let Some(phase) = self.def.phases.get(index) else {
            return;
        };
        self.phase = index;
        self.slots = phase.patterns.iter().copied().map(PatternSlot::new).collect();
        self.speed = phase.speed.unwrap_or(self.def.speed);
    }
}

pub(super) fn desc(def: Rc<BossDef>, position: Vec2) -> EntityDesc {
    let texture = TextureDesc::new(def.texture.clone(), BOSS_LAYER);
    EntityDesc {
        kind: EntityKind::Boss(Box::new(BossState::new(def))),
        transform: Transform::new(position, BOSS_SIZE),
        texture: Some(texture),
        collision: Some(
            Collision2D::new(
                CollisionLayer::Boss,
                LayerMask::of(&[CollisionLayer::PlayerProjectile]),
                respond,
            )
            .with_hitbox_modifier(BOSS_HITBOX),
        ),
        input: false,
    }
}

pub(super) fn update(state: &mut BossState, body: &mut Body<'_>, ctx: &mut UpdateContext<'_>) {
    if let Some(next) = state.pending_phase.take() {
        match state.set_phase(next) {
            Ok(true) => enter_phase(state, body.id, ctx),
            Ok(false) => {}
            Err(error) => warn!(boss = body.id.0, error = %error, "boss_phase_rejected"),
        }
    }

    let Some(transform) = body.components.transform_mut() else {
        return;
    };

    state.direction_timer -= ctx.dt;
    if state.direction_timer <= 0.0 {
        if ctx.rng.gen_bool(0.5) {
            state.direction.x = -state.direction.x;
        } else if ctx.rng.gen_bool(0.5) {
            state.direction.y = -state.direction.y;
        }
        state.direction_timer = ctx.rng.gen_range(DIRECTION_CHANGE_MIN..DIRECTION_CHANGE_MAX);
    }

    let movement = state.def.movement;
    let step = state.speed * ctx.dt;
    let (x, direction_x) = bounce_within(
        transform.position.x + step * state.direction.x,
        movement.min_x,
        movement.max_x,
        state.direction.x,
    );
    transform.position.x = x;
    state.direction.x = direction_x;
    if movement.vertical {
        let (y, direction_y) = bounce_within(
            transform.position.y + step * state.direction.y,
            movement.min_y,
            movement.max_y,
            state.direction.y,
        );
        transform.position.y = y;
        state.direction.y = direction_y;
    }

    let origin = PatternOrigin {
        boss: body.id,
        rect: *transform,
        target: ctx.player.map(|player| player.center),
    };
    for slot in &mut state.slots {
        if slot.tick(ctx.dt) {
            (slot.fire)(&origin, ctx);
        }
    }
}

fn bounce_within(value: f32, min: f32, max: f32, direction: f32) -> (f32, f32) {
    if value > max {
        (max, -1.0)
    } else if value < min {
        (min, 1.0)
    } else {
        (value, direction)
    }
}

fn enter_phase(state: &BossState, boss: EntityId, ctx: &mut UpdateContext<'_>) {
    let phase = state.phase;
    info!(
        boss = boss.0,
        phase,
        health = state.health,
        patterns = state.slots.len(),
        "boss_phase_changed"
    );
    ctx.emit(SceneEvent::BossPhaseChanged { boss, phase });

    let Some(def) = state.def.phases.get(phase) else {
        return;
    };
    if let Some(script) = &def.dialogue {
        ctx.emit(SceneEvent::DialogueRequested {
            script: script.clone(),
        });
    }
    for position in enemy::formation(def.summon_enemies, ctx.world_size) {
        ctx.spawn(EntityDesc::enemy(position));
    }
}

fn shot(
    origin: &PatternOrigin,
    texture: &str,
    center: Vec2,
    size: Vec2,
    velocity: Vec2,
) -> ProjectileSpec {
    ProjectileSpec::hostile(origin.boss, texture, center - size * 0.5, size, velocity)
        .with_hitbox_modifier(BOSS_PROJECTILE_HITBOX)
}

fn below_boss(origin: &PatternOrigin) -> f32 {
    origin.rect.position.y + origin.rect.extent().y + SPAWN_MARGIN
}

/// Evenly spaced spikes under the boss that rise, rebound off the top and fall faster.
fn fire_rain(origin: &PatternOrigin, ctx: &mut UpdateContext<'_>) {
    let center_x = origin.rect.center().x;
    let spacing = RAIN_SPREAD / (RAIN_COUNT as f32 - 1.0);
    let y = below_boss(origin) + RAIN_SIZE.y * 0.5;
    for index in 0..RAIN_COUNT {
        let x = center_x - RAIN_SPREAD * 0.5 + spacing * index as f32;
        let spec = shot(
            origin,
            RAIN_TEXTURE,
            Vec2::new(x, y),
            RAIN_SIZE,
            Vec2::new(0.0, -RAIN_SPEED),
        )
        .with_rotation(180.0)
        .with_motion(ProjectileMotion::Bounce {
            boost: RAIN_BOOST,
            bounced: false,
        });
        ctx.spawn(EntityDesc::projectile(spec));
    }
}

fn fire_fan(
    origin: &PatternOrigin,
    ctx: &mut UpdateContext<'_>,
    texture: &str,
    half_arc: i32,
    step: usize,
    size: Vec2,
    speed: f32,
) {
    let center = origin.rect.center();
    for offset in (-half_arc..=half_arc).step_by(step) {
        // 0 degrees on the fan is straight down.
        let angle = offset as f32 + 90.0;
        let spec = shot(
            origin,
            texture,
            center,
            size,
            Vec2::from_angle_degrees(angle, speed),
        )
        .with_rotation(angle - 90.0);
        ctx.spawn(EntityDesc::projectile(spec));
    }
}

fn fire_spread(origin: &PatternOrigin, ctx: &mut UpdateContext<'_>) {
    fire_fan(origin, ctx, SPREAD_TEXTURE, 90, 15, SPREAD_SIZE, SPREAD_SPEED);
}

fn fire_ghost(origin: &PatternOrigin, ctx: &mut UpdateContext<'_>) {
    fire_fan(origin, ctx, GHOST_TEXTURE, 60, 20, GHOST_SIZE, GHOST_SPEED);
}

fn fire_slash(origin: &PatternOrigin, ctx: &mut UpdateContext<'_>) {
    let Some(target) = origin.target else {
        return;
    };
    let center = origin.rect.center();
    let angle = (target - center).angle_degrees();
    let spec = shot(
        origin,
        SLASH_TEXTURE,
        center,
        SLASH_SIZE,
        Vec2::from_angle_degrees(angle, SLASH_SPEED),
    )
    .with_rotation(angle)
    .with_motion(ProjectileMotion::Spinning {
        degrees_per_second: SLASH_SPIN,
    });
    ctx.spawn(EntityDesc::projectile(spec));
}

/// A row of fireballs spanning most of the boss width.
fn fire_ultimate(origin: &PatternOrigin, ctx: &mut UpdateContext<'_>) {
    let width = origin.rect.extent().x;
    let count = (width * ULTIMATE_ROW_COVERAGE / ULTIMATE_SIZE.x).floor() as usize;
    let row_width = count as f32 * ULTIMATE_SIZE.x;
    let start_x = origin.rect.center().x - row_width * 0.5 + ULTIMATE_SIZE.x * 0.5;
    let y = below_boss(origin) + ULTIMATE_SIZE.y * 0.5;
    for index in 0..count {
        let x = start_x + ULTIMATE_SIZE.x * index as f32;
        let spec = shot(
            origin,
            ULTIMATE_TEXTURE,
            Vec2::new(x, y),
            ULTIMATE_SIZE,
            Vec2::new(0.0, ULTIMATE_SPEED),
        );
        ctx.spawn(EntityDesc::projectile(spec));
    }
}

fn respond(
    entity: &mut Entity,
    peer: &CollisionPeer,
    commands: &mut CommandQueue,
) -> Result<(), ResponseError> {
    let id = entity.id();
    let EntityKind::Boss(state) = entity.kind_mut() else {
        return Err(ResponseError::KindMismatch {
            id,
            expected: EntityKindTag::Boss,
        });
    };
    if peer.damage == 0 || state.is_defeated() {
        return Ok(());
    }

    let lethal = state.apply_damage(peer.damage);
    commands.emit(SceneEvent::TargetHit {
        target: id,
        kind: EntityKindTag::Boss,
    });
    if lethal {
        entity.request_destroy();
        commands.emit(SceneEvent::BossDefeated { boss: id });
    }
    Ok(())
}
