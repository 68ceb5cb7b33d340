use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use super::input::ActionStates;
use super::metrics::MetricsAccumulator;
use super::{
    Application, ApplicationConfig, AssetStore, FrameOutcome, FrameRenderer, InputAction,
    InputSnapshot, InputSource, MetricsHandle, ResourceManager, SceneDirector, SceneKey,
    SceneLoadError, Vec2,
};

/// Window and pacing settings. Every field has a default, so partial JSON documents load.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub target_tps: u32,
    pub max_frame_delta_ms: u64,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval_ms: u64,
    pub max_render_fps: Option<u32>,
    pub max_update_dt: f32,
    pub world_width: f32,
    pub world_height: f32,
    pub seed: u64,
    /// Overrides the director's first scene.
    pub start_scene: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        let application = ApplicationConfig::default();
        Self {
            window_title: "OldBow".to_string(),
            window_width: 1280,
            window_height: 720,
            target_tps: 60,
            max_frame_delta_ms: 250,
            max_ticks_per_frame: 5,
            metrics_log_interval_ms: 1000,
            max_render_fps: None,
            max_update_dt: application.max_update_dt,
            world_width: application.world_size.x,
            world_height: application.world_size.y,
            seed: application.seed,
            start_scene: None,
        }
    }
}

impl LoopConfig {
    pub fn application_config(&self) -> ApplicationConfig {
        let fallback = ApplicationConfig::default();
        let world_size = if self.world_width > 0.0 && self.world_height > 0.0 {
            Vec2::new(self.world_width, self.world_height)
        } else {
            fallback.world_size
        };
        let max_update_dt = if self.max_update_dt > 0.0 {
            self.max_update_dt
        } else {
            fallback.max_update_dt
        };
        ApplicationConfig {
            world_size,
            max_update_dt,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("failed to load the first scene: {0}")]
    SceneLoad(#[from] SceneLoadError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(
    config: LoopConfig,
    store: Box<dyn AssetStore>,
    director: Box<dyn SceneDirector>,
) -> Result<(), AppError> {
    run_app_with_metrics(config, store, director, MetricsHandle::default())
}

/// Opens the window and drives `director`'s scenes at a fixed tick rate until quit.
pub fn run_app_with_metrics(
    config: LoopConfig,
    store: Box<dyn AssetStore>,
    director: Box<dyn SceneDirector>,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let application_config = config.application_config();
    let mut app = Application::new(application_config, ResourceManager::new(store), director);
    match &config.start_scene {
        Some(key) => app.start_at(SceneKey::from(key.as_str()))?,
        None => app.start()?,
    }

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let mut renderer = FrameRenderer::new(Arc::clone(&window), application_config.world_size)
        .map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let target_tps = config.target_tps.max(1);
    let max_frame_delta = normalize_non_zero_duration(
        Duration::from_millis(config.max_frame_delta_ms),
        Duration::from_millis(250),
    );
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval = normalize_non_zero_duration(
        Duration::from_millis(config.metrics_log_interval_ms),
        Duration::from_secs(1),
    );
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let effective_render_cap = normalize_render_fps_cap(config.max_render_fps);
    let render_frame_target = target_frame_duration(effective_render_cap);
    let mut input_collector = InputCollector::default();

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        render_fps_cap = %format_render_cap(effective_render_cap),
        world_width = application_config.world_size.x,
        world_height = application_config.world_size.y,
        "loop_config"
    );

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut last_present_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut last_applied_title: Option<String> = None;

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                        error!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::ScaleFactorChanged { .. } => {
                    let size = window.inner_size();
                    if let Err(error) = renderer.resize(size.width, size.height) {
                        error!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    input_collector.set_cursor_position_px(position.x as f32, position.y as f32);
                }
                WindowEvent::CursorLeft { .. } => input_collector.clear_cursor_position(),
                WindowEvent::MouseInput { state, button, .. } => {
                    input_collector.handle_mouse_input(button, state);
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    input_collector.handle_keyboard_input(&event);
                }
                WindowEvent::Focused(false) => input_collector.release_all(),
                WindowEvent::RedrawRequested => {
                    let now = Instant::now();
                    let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                    last_frame_instant = now;

                    let clamped_dt = clamp_frame_delta(raw_frame_dt, max_frame_delta);
                    accumulator = accumulator.saturating_add(clamped_dt);
                    let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
                    let mut quit = false;
                    for _ in 0..step_plan.ticks_to_run {
                        let input_snapshot = input_collector.snapshot_for_tick();
                        let outcome = app.tick(fixed_dt_seconds, &input_snapshot);
                        metrics_accumulator.record_tick(app.last_tick_collisions());
                        if outcome == FrameOutcome::Quit {
                            quit = true;
                            break;
                        }
                    }
                    accumulator = step_plan.remaining_accumulator;

                    if step_plan.dropped_backlog > Duration::ZERO {
                        let dropped = (step_plan.dropped_backlog.as_nanos()
                            / fixed_dt.as_nanos().max(1)) as u32;
                        metrics_accumulator.record_dropped_ticks(dropped);
                        warn!(
                            dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                            max_ticks_per_frame, "sim_clamp_triggered"
                        );
                    }
                    if quit {
                        info!(reason = "application_quit", "shutdown_requested");
                        window_target.exit();
                        return;
                    }

                    let elapsed_since_last_present =
                        Instant::now().saturating_duration_since(last_present_instant);
                    let cap_sleep =
                        compute_cap_sleep(elapsed_since_last_present, render_frame_target);
                    if cap_sleep > Duration::ZERO {
                        thread::sleep(cap_sleep);
                    }

                    app.render(&mut renderer);
                    if let Err(error) = renderer.present() {
                        error!(error = %error, "renderer_present_failed");
                        window_target.exit();
                    }
                    last_present_instant = Instant::now();

                    let next_title = app.title();
                    if next_title != last_applied_title {
                        window.set_title(next_title.as_deref().unwrap_or(&config.window_title));
                        last_applied_title = next_title;
                    }
                    metrics_accumulator.record_frame(raw_frame_dt, app.entity_count());

                    if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
                        metrics_handle.publish(snapshot);
                        info!(
                            fps = snapshot.fps,
                            tps = snapshot.tps,
                            frame_time_ms = snapshot.frame_time_ms,
                            worst_frame_ms = snapshot.worst_frame_ms,
                            entity_count = snapshot.entity_count,
                            collision_tests_per_tick = snapshot.collision_tests_per_tick,
                            response_failures = snapshot.response_failures,
                            scene = app.scene().map(|scene| scene.key().as_str()).unwrap_or(""),
                            dialogue = app.dialogue().is_active(),
                            "loop_metrics"
                        );
                    }
                }
                _ => {}
            },
            Event::AboutToWait => window.request_redraw(),
            Event::LoopExiting => {
                app.shutdown();
                info!(frames = renderer.presented_frames(), "shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

/// Folds window events into per-tick snapshots. Press edges survive until the next snapshot.
#[derive(Debug, Default)]
struct InputCollector {
    held: ActionStates,
    pressed_edges: ActionStates,
    left_mouse_is_down: bool,
    cursor_position_px: Option<Vec2>,
}

impl InputCollector {
    fn handle_keyboard_input(&mut self, key_event: &KeyEvent) {
        let is_pressed = key_event.state == ElementState::Pressed;
        for action in actions_for_key(key_event.physical_key) {
            self.set_action(*action, is_pressed);
        }
    }

    fn handle_mouse_input(&mut self, button: MouseButton, state: ElementState) {
        if button != MouseButton::Left {
            return;
        }
        let is_pressed = state == ElementState::Pressed;
        if is_pressed && !self.left_mouse_is_down {
            self.pressed_edges.set(InputAction::Advance, true);
        }
        self.left_mouse_is_down = is_pressed;
    }

    fn set_action(&mut self, action: InputAction, is_pressed: bool) {
        if is_pressed && !self.held.is_down(action) {
            self.pressed_edges.set(action, true);
        }
        self.held.set(action, is_pressed);
    }

    /// Held keys are dropped when the window loses focus; their release never arrives.
    fn release_all(&mut self) {
        self.held.clear();
        self.left_mouse_is_down = false;
    }

    fn set_cursor_position_px(&mut self, x: f32, y: f32) {
        self.cursor_position_px = Some(Vec2::new(x, y));
    }

    fn clear_cursor_position(&mut self) {
        self.cursor_position_px = None;
    }
}

impl InputSource for InputCollector {
    fn snapshot_for_tick(&mut self) -> InputSnapshot {
        let snapshot =
            InputSnapshot::from_states(self.held, self.pressed_edges, self.cursor_position_px);
        self.pressed_edges.clear();
        snapshot
    }
}

fn actions_for_key(key: PhysicalKey) -> &'static [InputAction] {
    let PhysicalKey::Code(code) = key else {
        return &[];
    };
    match code {
        KeyCode::KeyW | KeyCode::ArrowUp => &[InputAction::MoveUp],
        KeyCode::KeyS | KeyCode::ArrowDown => &[InputAction::MoveDown],
        KeyCode::KeyA | KeyCode::ArrowLeft => &[InputAction::MoveLeft],
        KeyCode::KeyD | KeyCode::ArrowRight => &[InputAction::MoveRight],
        KeyCode::Space => &[InputAction::Fire],
        KeyCode::Enter | KeyCode::NumpadEnter => &[InputAction::Advance],
        KeyCode::Escape => &[InputAction::Quit],
        _ => &[],
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;
    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn normalize_render_fps_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_render_fps: Option<u32>) -> Option<Duration> {
    max_render_fps.map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(input: &mut InputCollector, key: KeyCode) {
        for action in actions_for_key(PhysicalKey::Code(key)) {
            input.set_action(*action, true);
        }
    }

    fn release(input: &mut InputCollector, key: KeyCode) {
        for action in actions_for_key(PhysicalKey::Code(key)) {
            input.set_action(*action, false);
        }
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let result = plan_sim_steps(Duration::from_millis(50), Duration::from_millis(16), 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(2));
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let result = plan_sim_steps(Duration::from_millis(120), Duration::from_millis(16), 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn movement_keys_map_to_actions() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::KeyA);
        press(&mut input, KeyCode::ArrowUp);

        let snapshot = input.snapshot_for_tick();
        assert!(snapshot.is_down(InputAction::MoveLeft));
        assert!(snapshot.is_down(InputAction::MoveUp));
        assert_eq!(snapshot.movement_axis(), Vec2::new(-1.0, -1.0));
    }

    #[test]
    fn fire_press_is_edge_triggered_but_stays_held() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::Space);

        let first = input.snapshot_for_tick();
        let second = input.snapshot_for_tick();

        assert!(first.was_pressed(InputAction::Fire));
        assert!(!second.was_pressed(InputAction::Fire));
        assert!(second.is_down(InputAction::Fire));
    }

    #[test]
    fn key_repeat_does_not_retrigger_edge() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::Enter);
        assert!(input.snapshot_for_tick().was_pressed(InputAction::Advance));

        press(&mut input, KeyCode::Enter);
        assert!(!input.snapshot_for_tick().was_pressed(InputAction::Advance));

        release(&mut input, KeyCode::Enter);
        press(&mut input, KeyCode::Enter);
        assert!(input.snapshot_for_tick().was_pressed(InputAction::Advance));
    }

    #[test]
    fn tap_between_ticks_still_registers() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::Space);
        release(&mut input, KeyCode::Space);

        let snapshot = input.snapshot_for_tick();
        assert!(snapshot.was_pressed(InputAction::Fire));
        assert!(!snapshot.is_down(InputAction::Fire));
    }

    #[test]
    fn left_click_advances_dialogue_once() {
        let mut input = InputCollector::default();
        input.handle_mouse_input(MouseButton::Left, ElementState::Pressed);
        input.handle_mouse_input(MouseButton::Left, ElementState::Pressed);

        assert!(input.snapshot_for_tick().was_pressed(InputAction::Advance));
        assert!(!input.snapshot_for_tick().was_pressed(InputAction::Advance));

        input.handle_mouse_input(MouseButton::Right, ElementState::Pressed);
        assert!(!input.snapshot_for_tick().was_pressed(InputAction::Advance));
    }

    #[test]
    fn focus_loss_releases_held_keys() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::KeyD);
        input.release_all();

        assert!(!input.snapshot_for_tick().is_down(InputAction::MoveRight));
    }

    #[test]
    fn snapshot_carries_cursor() {
        let mut input = InputCollector::default();
        input.set_cursor_position_px(100.0, 200.0);
        assert_eq!(
            input.snapshot_for_tick().pointer_px(),
            Some(Vec2::new(100.0, 200.0))
        );

        input.clear_cursor_position();
        assert_eq!(input.snapshot_for_tick().pointer_px(), None);
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        assert!(actions_for_key(PhysicalKey::Code(KeyCode::F1)).is_empty());
        assert_eq!(
            actions_for_key(PhysicalKey::Code(KeyCode::Escape)),
            &[InputAction::Quit]
        );
    }

    #[test]
    fn compute_cap_sleep_respects_budget() {
        let target = target_frame_duration(Some(60));
        assert_eq!(compute_cap_sleep(Duration::from_millis(20), target), Duration::ZERO);
        assert!(compute_cap_sleep(Duration::from_millis(5), target) > Duration::ZERO);
        assert_eq!(compute_cap_sleep(Duration::from_millis(5), None), Duration::ZERO);
    }

    #[test]
    fn normalize_render_fps_cap_disables_zero() {
        assert_eq!(normalize_render_fps_cap(Some(0)), None);
        assert_eq!(normalize_render_fps_cap(Some(60)), Some(60));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: LoopConfig =
            serde_json::from_str(r#"{ "window_title": "Test", "target_tps": 30 }"#)
                .expect("config");

        assert_eq!(config.window_title, "Test");
        assert_eq!(config.target_tps, 30);
        assert_eq!(config.window_width, LoopConfig::default().window_width);
        assert_eq!(config.start_scene, None);
    }

    #[test]
    fn unknown_config_field_is_rejected() {
        let result = serde_json::from_str::<LoopConfig>(r#"{ "fullscreen": true }"#);
        assert!(result.is_err());
    }

    #[test]
    fn degenerate_world_size_falls_back() {
        let config = LoopConfig {
            world_width: 0.0,
            max_update_dt: -1.0,
            seed: 7,
            ..LoopConfig::default()
        };

        let application = config.application_config();
        assert_eq!(application.world_size, ApplicationConfig::default().world_size);
        assert_eq!(application.max_update_dt, ApplicationConfig::default().max_update_dt);
        assert_eq!(application.seed, 7);
    }
}
