use thiserror::Error;
use tracing::{debug, info};

use super::resources::report_stale_handle;
use super::{DialogueView, LoadError, ResourceHandle, ResourceManager, SceneCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogueState {
    Inactive,
    /// A line is queued and will be presented on the next tick.
    Playing,
    AwaitingAdvance,
    /// Last line dismissed. The on-finish command has not been collected yet.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dialogue {active_script} is already running")]
pub struct AlreadyActiveError {
    pub active_script: String,
}

#[derive(Debug, Error)]
pub enum DialogueError {
    #[error(transparent)]
    AlreadyActive(#[from] AlreadyActiveError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{key}: {message}")]
    Script { key: String, message: String },
}

/// Parsed dialogue asset: `background: <texture key>` and `line: <text>` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueScript {
    pub key: String,
    pub background: Option<String>,
    pub lines: Vec<String>,
}

impl DialogueScript {
    pub fn parse(key: &str, text: &str) -> Result<Self, DialogueError> {
        let mut background = None;
        let mut lines = Vec::new();
        for raw in text.lines() {
            let Some((name, value)) = raw.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim() {
                "background" if !value.is_empty() => background = Some(value.to_string()),
                "line" => lines.push(value.to_string()),
                _ => {}
            }
        }

        if lines.is_empty() {
            return Err(DialogueError::Script {
                key: key.to_string(),
                message: "script has no lines".to_string(),
            });
        }
        Ok(Self {
            key: key.to_string(),
            background,
            lines,
        })
    }
}

#[derive(Debug)]
struct ActiveDialogue {
    script: DialogueScript,
    cursor: usize,
    background: Option<ResourceHandle>,
    on_finish: SceneCommand,
}

/// Runs one script at a time. Gameplay input is routed here while `is_active`.
#[derive(Debug)]
pub struct DialogueManager {
    state: DialogueState,
    active: Option<ActiveDialogue>,
}

impl Default for DialogueManager {
    fn default() -> Self {
        Self {
            state: DialogueState::Inactive,
            active: None,
        }
    }
}

impl DialogueManager {
    pub fn state(&self) -> DialogueState {
        self.state
    }

    /// True from a successful `trigger` until the finished command is collected.
    pub fn is_active(&self) -> bool {
        self.state != DialogueState::Inactive
    }

    pub fn script_key(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.script.key.as_str())
    }

    pub fn cursor(&self) -> Option<usize> {
        self.active.as_ref().map(|active| active.cursor)
    }

    pub fn current_line(&self) -> Option<&str> {
        let active = self.active.as_ref()?;
        active.script.lines.get(active.cursor).map(String::as_str)
    }

    /// Loads and starts `script_key`. Rejected without side effects unless inactive.
    pub fn trigger(
        &mut self,
        script_key: &str,
        on_finish: SceneCommand,
        resources: &mut ResourceManager,
    ) -> Result<(), DialogueError> {
        if let Some(active_script) = self.script_key() {
            return Err(AlreadyActiveError {
                active_script: active_script.to_string(),
            }
            .into());
        }

        let text = resources.read_text(script_key)?;
        self.start(DialogueScript::parse(script_key, &text)?, on_finish, resources)
    }

    /// Starts an already parsed script.
    pub fn start(
        &mut self,
        script: DialogueScript,
        on_finish: SceneCommand,
        resources: &mut ResourceManager,
    ) -> Result<(), DialogueError> {
        if let Some(active_script) = self.script_key() {
            return Err(AlreadyActiveError {
                active_script: active_script.to_string(),
            }
            .into());
        }

        let background = match &script.background {
            Some(key) => Some(resources.acquire_texture(key)?),
            None => None,
        };
        info!(
            script = %script.key,
            lines = script.lines.len(),
            background = script.background.as_deref().unwrap_or(""),
            "dialogue_started"
        );
        self.active = Some(ActiveDialogue {
            script,
            cursor: 0,
            background,
            on_finish,
        });
        self.state = DialogueState::Playing;
        Ok(())
    }

    /// Presents the queued line.
    pub fn tick(&mut self) {
        if self.state == DialogueState::Playing {
            self.state = DialogueState::AwaitingAdvance;
        }
    }

    /// Dismisses the presented line. Ignored unless a line is awaiting advance.
    pub fn advance(&mut self) -> DialogueState {
        if self.state != DialogueState::AwaitingAdvance {
            return self.state;
        }
        let Some(active) = self.active.as_mut() else {
            self.state = DialogueState::Inactive;
            return self.state;
        };

        if active.cursor + 1 < active.script.lines.len() {
            active.cursor += 1;
            self.state = DialogueState::Playing;
        } else {
            debug!(script = %active.script.key, "dialogue_finished");
            self.state = DialogueState::Finished;
        }
        self.state
    }

    /// Collects the on-finish command of a finished script and returns to inactive.
    pub fn take_finished(&mut self, resources: &mut ResourceManager) -> Option<SceneCommand> {
        if self.state != DialogueState::Finished {
            return None;
        }
        let active = self.active.take()?;
        release_background(active.background, resources);
        self.state = DialogueState::Inactive;
        Some(active.on_finish)
    }

    /// Abandons any running script without running its on-finish command.
    pub fn reset(&mut self, resources: &mut ResourceManager) {
        if let Some(active) = self.active.take() {
            debug!(script = %active.script.key, "dialogue_reset");
            release_background(active.background, resources);
        }
        self.state = DialogueState::Inactive;
    }

    pub fn view<'a>(&'a self, resources: &'a ResourceManager) -> Option<DialogueView<'a>> {
        if !matches!(
            self.state,
            DialogueState::Playing | DialogueState::AwaitingAdvance
        ) {
            return None;
        }
        let active = self.active.as_ref()?;
        let background = active.background.and_then(|handle| match resources.get(handle) {
            Ok(asset) => asset.as_texture(),
            Err(error) => {
                report_stale_handle(&error, "dialogue_view");
                None
            }
        });
        Some(DialogueView {
            line: active.script.lines.get(active.cursor)?,
            line_index: active.cursor,
            line_count: active.script.lines.len(),
            background,
        })
    }
}

fn release_background(handle: Option<ResourceHandle>, resources: &mut ResourceManager) {
    if let Some(handle) = handle {
        if let Err(error) = resources.release(handle) {
            report_stale_handle(&error, "dialogue_background_release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::builtin_resources;
    use crate::app::SceneKey;

    const SCRIPT: &str = "dialogue/intro.txt";

    fn resources_with_script() -> ResourceManager {
        let (resources, mut store) = builtin_resources();
        store.insert_text(
            SCRIPT,
            "background: textures/intro_bg.png\n\
             line: First.\n\
             # note\n\
             line: Second.\n\
             line: Third.\n",
        );
        store.insert_texture("textures/intro_bg.png", 8, 8);
        resources
    }

    fn play_line(dialogue: &mut DialogueManager) -> DialogueState {
        dialogue.tick();
        dialogue.advance()
    }

    #[test]
    fn parse_reads_background_and_lines_in_order() {
        let script = DialogueScript::parse(
            "k",
            "background: bg.png\nnote: skipped\nline: a: b\nline:  spaced  \n",
        )
        .expect("script");

        assert_eq!(script.background.as_deref(), Some("bg.png"));
        assert_eq!(script.lines, vec!["a: b".to_string(), "spaced".to_string()]);
    }

    #[test]
    fn script_without_lines_is_rejected() {
        let error = DialogueScript::parse("k", "background: bg.png\n").expect_err("empty");
        assert!(matches!(error, DialogueError::Script { .. }));
    }

    #[test]
    fn n_advances_finish_an_n_line_script() {
        let mut resources = resources_with_script();
        let mut dialogue = DialogueManager::default();
        let on_finish = SceneCommand::SwitchTo(SceneKey::from("next"));

        dialogue
            .trigger(SCRIPT, on_finish.clone(), &mut resources)
            .expect("trigger");
        assert_eq!(dialogue.state(), DialogueState::Playing);
        assert_eq!(resources.refcount("textures/intro_bg.png"), 1);

        assert_eq!(play_line(&mut dialogue), DialogueState::Playing);
        assert_eq!(dialogue.current_line(), Some("Second."));
        assert_eq!(play_line(&mut dialogue), DialogueState::Playing);
        assert_eq!(play_line(&mut dialogue), DialogueState::Finished);
        assert!(dialogue.view(&resources).is_none());

        assert_eq!(dialogue.take_finished(&mut resources), Some(on_finish));
        assert_eq!(dialogue.state(), DialogueState::Inactive);
        assert!(!resources.is_cached("textures/intro_bg.png"));
        assert!(dialogue.take_finished(&mut resources).is_none());
    }

    #[test]
    fn trigger_while_playing_keeps_current_cursor() {
        let mut resources = resources_with_script();
        let mut dialogue = DialogueManager::default();
        dialogue
            .trigger(SCRIPT, SceneCommand::None, &mut resources)
            .expect("trigger");
        play_line(&mut dialogue);

        let error = dialogue
            .trigger(SCRIPT, SceneCommand::Quit, &mut resources)
            .expect_err("already active");

        match error {
            DialogueError::AlreadyActive(error) => assert_eq!(error.active_script, SCRIPT),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(dialogue.cursor(), Some(1));
        assert_eq!(dialogue.state(), DialogueState::Playing);
    }

    #[test]
    fn advance_before_presentation_is_ignored() {
        let mut resources = resources_with_script();
        let mut dialogue = DialogueManager::default();
        dialogue
            .trigger(SCRIPT, SceneCommand::None, &mut resources)
            .expect("trigger");

        assert_eq!(dialogue.advance(), DialogueState::Playing);
        assert_eq!(dialogue.cursor(), Some(0));
    }

    #[test]
    fn missing_script_leaves_manager_inactive() {
        let (mut resources, _store) = builtin_resources();
        let mut dialogue = DialogueManager::default();

        let error = dialogue
            .trigger("dialogue/missing.txt", SceneCommand::None, &mut resources)
            .expect_err("missing");

        assert!(matches!(error, DialogueError::Load(_)));
        assert!(!dialogue.is_active());
        assert_eq!(resources.cached_count(), 0);
    }

    #[test]
    fn view_exposes_line_and_background() {
        let mut resources = resources_with_script();
        let mut dialogue = DialogueManager::default();
        dialogue
            .trigger(SCRIPT, SceneCommand::None, &mut resources)
            .expect("trigger");
        dialogue.tick();

        let view = dialogue.view(&resources).expect("view");
        assert_eq!(view.line, "First.");
        assert_eq!(view.line_count, 3);
        assert_eq!(view.background.map(|texture| texture.width), Some(8));
    }

    #[test]
    fn reset_releases_background_and_drops_command() {
        let mut resources = resources_with_script();
        let mut dialogue = DialogueManager::default();
        dialogue
            .trigger(SCRIPT, SceneCommand::Quit, &mut resources)
            .expect("trigger");

        dialogue.reset(&mut resources);

        assert!(!dialogue.is_active());
        assert_eq!(resources.cached_count(), 0);
        assert!(dialogue.take_finished(&mut resources).is_none());
    }
}
