use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use tokio::sync::watch;
use vitrine_contracts::events::{payload, EventWriter};
use vitrine_contracts::{
    ColorSwatch, FailureNotice, GenerationSettings, HistoryItem, HistoryLedger, ReferenceImage,
    ReferenceSet, Rejection, StudioError, StudioResult,
};

use crate::backend::StudioBackend;
use crate::composer::{check_compose, compose_prompt, ComposedPrompt};
use crate::orchestrator::{check_generation, run_generation};
use crate::progress::{ProgressSink, ProgressStage, SessionStatus};

/// Result of a long-running flow.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome<T> {
    Completed(T),
    Rejected(Rejection),
    Failed(FailureNotice),
}

impl<T> FlowOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::Completed(_) => None,
            Self::Rejected(rejection) => Some(Notice::Rejected(*rejection)),
            Self::Failed(failure) => Some(Notice::Failed(*failure)),
        }
    }
}

/// Last message surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Rejected(Rejection),
    Failed(FailureNotice),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(rejection) => write!(f, "{rejection}"),
            Self::Failed(failure) => write!(f, "{failure}"),
        }
    }
}

#[derive(Debug, Default)]
struct SessionContext {
    references: ReferenceSet,
    prompt: String,
    swatches: Vec<ColorSwatch>,
    settings: GenerationSettings,
    latest: Option<HistoryItem>,
    history: HistoryLedger,
    last_notice: Option<Notice>,
    // Bumped by every clear-canvas; a flow only writes the canvas if it is
    // unchanged since the flow started.
    canvas_epoch: u64,
}

/// Holds the busy token for one flow.
///
/// Stage changes go to the status channel and the event log. Dropping the
/// guard returns the session to `Idle` on every exit path.
struct BusyGuard<'a> {
    status: &'a watch::Sender<SessionStatus>,
    events: &'a EventWriter,
    flow: &'static str,
}

impl ProgressSink for BusyGuard<'_> {
    fn stage(&self, stage: ProgressStage) {
        self.status.send_replace(SessionStatus::Busy(stage));
        self.events.record(
            "progress",
            payload(json!({
                "flow": self.flow,
                "stage": stage,
                "label": stage.label(),
            })),
        );
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.status.send_replace(SessionStatus::Idle);
    }
}

/// Single-session coordinator.
///
/// Owns the session context and the busy token. Every mutation goes through
/// a method here; reads always see the latest committed value.
pub struct SessionController {
    backend: Arc<dyn StudioBackend>,
    context: Mutex<SessionContext>,
    status: watch::Sender<SessionStatus>,
    events: EventWriter,
}

impl SessionController {
    pub fn new(backend: Arc<dyn StudioBackend>, events: EventWriter) -> Self {
        Self::with_settings(backend, events, GenerationSettings::default())
    }

    pub fn with_settings(
        backend: Arc<dyn StudioBackend>,
        events: EventWriter,
        settings: GenerationSettings,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        events.record(
            "session_started",
            payload(json!({
                "backend": backend.name(),
                "settings": settings,
            })),
        );
        tracing::info!(
            backend = backend.name(),
            session_id = events.session_id(),
            "session started"
        );
        Self {
            backend,
            context: Mutex::new(SessionContext {
                settings,
                ..SessionContext::default()
            }),
            status,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn session_id(&self) -> &str {
        self.events.session_id()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.status.borrow().is_busy()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn references(&self) -> Vec<ReferenceImage> {
        self.lock().references.images().to_vec()
    }

    pub fn prompt(&self) -> String {
        self.lock().prompt.clone()
    }

    pub fn swatches(&self) -> Vec<ColorSwatch> {
        self.lock().swatches.clone()
    }

    pub fn settings(&self) -> GenerationSettings {
        self.lock().settings.clone()
    }

    /// The last result, cut to the current variant count.
    pub fn latest_images(&self) -> Vec<String> {
        self.latest_result()
            .map(|item| item.generated_images)
            .unwrap_or_default()
    }

    /// The generation behind [`Self::latest_images`], holding only the images
    /// that view shows. `None` once the canvas is cleared.
    pub fn latest_result(&self) -> Option<HistoryItem> {
        let context = self.lock();
        let shown = context.settings.variant_count.get();
        context.latest.as_ref().map(|item| item.first_images(shown))
    }

    /// Newest first.
    pub fn history(&self) -> Vec<HistoryItem> {
        self.lock().history.list()
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn last_notice(&self) -> Option<Notice> {
        self.lock().last_notice
    }

    pub fn add_reference(&self, image: ReferenceImage) -> Result<String, Rejection> {
        self.edit("add_reference", |context, events| {
            events.record(
                "reference_added",
                payload(json!({
                    "id": image.id,
                    "file_name": image.file_name,
                    "mime_type": image.mime_type,
                    "byte_len": image.byte_len,
                })),
            );
            context.references.add(image)
        })
    }

    pub fn remove_reference(&self, id: &str) -> Result<Option<ReferenceImage>, Rejection> {
        self.edit("remove_reference", |context, events| {
            let removed = context.references.remove(id);
            if let Some(image) = removed.as_ref() {
                events.record(
                    "reference_removed",
                    payload(json!({ "id": image.id, "file_name": image.file_name })),
                );
            }
            removed
        })
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) -> Result<(), Rejection> {
        let prompt = prompt.into();
        self.edit("set_prompt", |context, _| context.prompt = prompt)
    }

    pub fn update_settings(&self, settings: GenerationSettings) -> Result<(), Rejection> {
        self.edit("update_settings", |context, events| {
            events.record("settings_updated", payload(json!({ "settings": settings })));
            context.settings = settings;
        })
    }

    /// Applies one textual `key value` update. An invalid value leaves the
    /// settings untouched.
    pub fn apply_setting(&self, key: &str, value: &str) -> StudioResult<GenerationSettings> {
        self.edit("apply_setting", |context, events| -> StudioResult<GenerationSettings> {
            let mut updated = context.settings.clone();
            updated.apply(key, value)?;
            events.record(
                "settings_updated",
                payload(json!({ "key": key, "value": value, "settings": updated })),
            );
            context.settings = updated.clone();
            Ok(updated)
        })?
    }

    /// Empties references, prompt, swatches and the latest result. History
    /// is kept. Allowed at any time, including while a flow runs.
    pub fn clear_canvas(&self) {
        let mut context = self.lock();
        context.references.clear();
        context.prompt.clear();
        context.swatches.clear();
        context.latest = None;
        context.canvas_epoch += 1;
        self.events.record("canvas_cleared", payload(json!({})));
        tracing::debug!("canvas cleared");
    }

    /// Analyses the references and replaces the prompt and swatches with
    /// the composed result.
    pub async fn auto_prompt(&self) -> FlowOutcome<ComposedPrompt> {
        let (guard, references, prompt, settings, epoch) = {
            let mut context = self.lock();
            let validation = check_compose(context.references.images());
            match self.begin(&mut context, "auto_prompt", ProgressStage::Analyzing, validation) {
                Ok(guard) => (
                    guard,
                    context.references.images().to_vec(),
                    context.prompt.clone(),
                    context.settings.clone(),
                    context.canvas_epoch,
                ),
                Err(rejection) => return FlowOutcome::Rejected(rejection),
            }
        };

        let result = compose_prompt(
            self.backend.as_ref(),
            &references,
            &prompt,
            &settings,
            &guard,
        )
        .await;

        let outcome = {
            let mut context = self.lock();
            match result {
                Ok(composed) => {
                    let applied = context.canvas_epoch == epoch;
                    if applied {
                        context.prompt = composed.prompt.clone();
                        context.swatches = composed.swatches.clone();
                    }
                    tracing::info!(applied, swatches = composed.swatches.len(), "prompt composed");
                    self.events.record(
                        "prompt_composed",
                        payload(json!({
                            "prompt": composed.prompt,
                            "swatches": composed.swatches,
                            "applied": applied,
                        })),
                    );
                    FlowOutcome::Completed(composed)
                }
                Err(err) => self.fail(&mut context, "auto_prompt", FailureNotice::PromptFailed, err),
            }
        };
        drop(guard);
        outcome
    }

    /// Generates images for the current prompt, references and settings.
    ///
    /// On success the result becomes the latest images and is prepended to
    /// history.
    pub async fn generate(&self) -> FlowOutcome<HistoryItem> {
        let (guard, prompt, references, settings, epoch) = {
            let mut context = self.lock();
            let validation = check_generation(&context.prompt, context.references.images());
            match self.begin(&mut context, "generate", ProgressStage::GeneratingImages, validation) {
                Ok(guard) => (
                    guard,
                    context.prompt.clone(),
                    context.references.images().to_vec(),
                    context.settings.clone(),
                    context.canvas_epoch,
                ),
                Err(rejection) => return FlowOutcome::Rejected(rejection),
            }
        };

        let result = run_generation(
            self.backend.as_ref(),
            &prompt,
            &references,
            &settings,
            &guard,
        )
        .await;

        let outcome = {
            let mut context = self.lock();
            match result {
                Ok(item) => {
                    let applied = context.canvas_epoch == epoch;
                    if applied {
                        context.latest = Some(item.clone());
                    }
                    context.history.append(item.clone());
                    tracing::info!(
                        history_id = %item.id,
                        images = item.image_count,
                        applied,
                        "generation completed"
                    );
                    self.events.record(
                        "generation_completed",
                        payload(json!({
                            "history_id": item.id,
                            "image_count": item.image_count,
                            "prompt": item.prompt,
                            "applied": applied,
                        })),
                    );
                    FlowOutcome::Completed(item)
                }
                Err(err) => self.fail(&mut context, "generate", FailureNotice::GenerationFailed, err),
            }
        };
        drop(guard);
        outcome
    }

    fn edit<T>(
        &self,
        action: &'static str,
        apply: impl FnOnce(&mut SessionContext, &EventWriter) -> T,
    ) -> Result<T, Rejection> {
        let mut context = self.lock();
        if self.is_busy() {
            return Err(self.reject_busy(action));
        }
        Ok(apply(&mut context, &self.events))
    }

    /// Checks busy, then `validation`, then takes the token.
    ///
    /// Runs under the context lock so no edit can slip between the checks
    /// and the caller's snapshot.
    fn begin(
        &self,
        context: &mut SessionContext,
        flow: &'static str,
        first_stage: ProgressStage,
        validation: Result<(), Rejection>,
    ) -> Result<BusyGuard<'_>, Rejection> {
        if self.is_busy() {
            return Err(self.reject_busy(flow));
        }
        if let Err(rejection) = validation {
            return Err(self.reject(context, flow, rejection));
        }
        let acquired = self.status.send_if_modified(|status| {
            if status.is_busy() {
                return false;
            }
            *status = SessionStatus::Busy(first_stage);
            true
        });
        if !acquired {
            return Err(self.reject_busy(flow));
        }

        context.last_notice = None;
        tracing::info!(flow, backend = self.backend.name(), "flow started");
        self.events.record("flow_started", payload(json!({ "flow": flow })));
        Ok(BusyGuard {
            status: &self.status,
            events: &self.events,
            flow,
        })
    }

    fn reject(
        &self,
        context: &mut SessionContext,
        action: &'static str,
        rejection: Rejection,
    ) -> Rejection {
        self.log_rejection(action, rejection);
        context.last_notice = Some(Notice::Rejected(rejection));
        rejection
    }

    /// The notice slot belongs to the running flow, so a busy rejection is
    /// only logged and returned.
    fn reject_busy(&self, action: &'static str) -> Rejection {
        self.log_rejection(action, Rejection::Busy);
        Rejection::Busy
    }

    fn log_rejection(&self, action: &'static str, rejection: Rejection) {
        tracing::warn!(action, reason = rejection.code(), "{rejection}");
        self.events.record(
            "flow_rejected",
            payload(json!({ "action": action, "reason": rejection.code() })),
        );
    }

    fn fail<T>(
        &self,
        context: &mut SessionContext,
        flow: &'static str,
        notice: FailureNotice,
        err: StudioError,
    ) -> FlowOutcome<T> {
        if let StudioError::Rejected(rejection) = &err {
            return FlowOutcome::Rejected(self.reject(context, flow, *rejection));
        }
        tracing::error!(flow, error = %err, "flow failed");
        self.events.record(
            "flow_failed",
            payload(json!({ "flow": flow, "error": err.to_string() })),
        );
        context.last_notice = Some(Notice::Failed(notice));
        FlowOutcome::Failed(notice)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use vitrine_contracts::events::EventWriter;
    use vitrine_contracts::{
        BackendOperation, FailureNotice, GenerationSettings, ReferenceImage, Rejection,
        StudioError, StylePreset, VariantCount,
    };

    use super::{FlowOutcome, Notice, SessionController};
    use crate::progress::{ProgressStage, SessionStatus};
    use crate::testing::{Gate, ScriptedBackend};

    fn controller(backend: &Arc<ScriptedBackend>) -> SessionController {
        SessionController::new(backend.clone(), EventWriter::disabled("test-session"))
    }

    fn reference(name: &str) -> ReferenceImage {
        ReferenceImage::new(name, "image/png", vec![9u8; 4])
    }

    fn event_types(path: &std::path::Path) -> anyhow::Result<Vec<String>> {
        Ok(std::fs::read_to_string(path)?
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row["type"].as_str().map(str::to_string))
            .collect())
    }

    #[tokio::test]
    async fn generate_without_references_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new());
        let session = controller(&backend);
        session.set_prompt("a mug").ok();

        let outcome = session.generate().await;

        assert_eq!(outcome, FlowOutcome::Rejected(Rejection::NoReferenceImages));
        assert_eq!(session.history_len(), 0);
        assert!(session.latest_images().is_empty());
        assert_eq!(backend.total_calls(), 0);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(
            session.last_notice(),
            Some(Notice::Rejected(Rejection::NoReferenceImages))
        );
    }

    #[tokio::test]
    async fn generate_with_blank_prompt_is_rejected() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let session = controller(&backend);
        session.add_reference(reference("a.png"))?;
        session.set_prompt("   ")?;

        let outcome = session.generate().await;

        assert_eq!(outcome, FlowOutcome::Rejected(Rejection::MissingPrompt));
        assert_eq!(backend.total_calls(), 0);
        assert_eq!(session.prompt(), "   ");
        Ok(())
    }

    #[tokio::test]
    async fn auto_prompt_without_references_makes_no_calls() {
        let backend = Arc::new(ScriptedBackend::new());
        let session = controller(&backend);

        let outcome = session.auto_prompt().await;

        assert_eq!(outcome, FlowOutcome::Rejected(Rejection::NoReferenceImages));
        assert_eq!(backend.total_calls(), 0);
        assert_eq!(session.prompt(), "");
    }

    #[tokio::test]
    async fn auto_prompt_commits_prompt_and_swatches() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_analysis("background #FF00FF, accent #abc, again #FF00FF")
                .with_prompt("magenta tote on white"),
        );
        let session = SessionController::new(
            backend.clone(),
            EventWriter::new(&events_path, "session-1"),
        );
        session.add_reference(reference("tote.png"))?;
        session.set_prompt("tote bag")?;
        session.apply_setting("style", "Luxury Editorial")?;

        let outcome = session.auto_prompt().await;

        assert!(outcome.is_completed());
        assert_eq!(session.prompt(), "magenta tote on white");
        let hexes: Vec<String> = session.swatches().into_iter().map(|s| s.hex).collect();
        assert_eq!(hexes, vec!["#FF00FF", "#abc"]);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.last_notice(), None);

        let calls = backend.prompt_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].existing_prompt, "tote bag");
        assert_eq!(calls[0].style_preset, StylePreset::LuxuryEditorial);

        let stages: Vec<String> = std::fs::read_to_string(&events_path)?
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter(|row| row["type"] == "progress")
            .filter_map(|row| row["stage"].as_str().map(str::to_string))
            .collect();
        assert_eq!(stages, vec!["analyzing", "generating_prompt"]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_auto_prompt_commits_nothing() -> anyhow::Result<()> {
        let backend =
            Arc::new(ScriptedBackend::new().failing(BackendOperation::GenerateFinalPrompt));
        let session = controller(&backend);
        session.add_reference(reference("a.png"))?;
        session.set_prompt("keep me")?;

        let outcome = session.auto_prompt().await;

        assert_eq!(outcome, FlowOutcome::Failed(FailureNotice::PromptFailed));
        assert_eq!(session.prompt(), "keep me");
        assert!(session.swatches().is_empty());
        assert_eq!(backend.analysis_calls(), 1);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(
            session.last_notice().map(|notice| notice.to_string()),
            Some("Failed to generate prompt.".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn latest_view_follows_variant_count() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new().with_images(&["img-1", "img-2"]));
        let session = controller(&backend);
        session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;

        let item = session.generate().await.completed();

        assert_eq!(session.latest_images(), vec!["img-1"]);
        let history = session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].generated_images, vec!["img-1", "img-2"]);
        assert_eq!(Some(&history[0]), item.as_ref());

        session.apply_setting("variants", "4")?;
        assert_eq!(session.latest_images(), vec!["img-1", "img-2"]);
        Ok(())
    }

    #[tokio::test]
    async fn history_items_keep_their_inputs() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let session = controller(&backend);
        let first_ref = reference("a.png");
        session.add_reference(first_ref.clone())?;
        session.set_prompt("first prompt")?;
        let settings_before = session.settings();

        session.generate().await;
        session.set_prompt("second prompt")?;
        session.apply_setting("guidance", "12")?;
        session.add_reference(reference("b.png"))?;
        session.generate().await;

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].prompt, "second prompt");
        assert_eq!(history[1].prompt, "first prompt");
        assert_eq!(history[1].settings, settings_before);
        assert_eq!(history[1].reference_images, vec![first_ref]);
        assert_eq!(history[0].reference_images.len(), 2);
        assert_eq!(history[0].settings.guidance_strength(), 12.0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_generation_keeps_previous_result() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new().with_images(&["old"]));
        let session = controller(&backend);
        session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;
        assert!(session.generate().await.is_completed());

        backend.fail_on(BackendOperation::GenerateImages);
        let outcome = session.generate().await;

        assert_eq!(outcome, FlowOutcome::Failed(FailureNotice::GenerationFailed));
        assert_eq!(session.latest_images(), vec!["old"]);
        assert_eq!(session.history_len(), 1);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(!session.is_busy());
        Ok(())
    }

    #[tokio::test]
    async fn second_flow_while_busy_is_rejected() -> anyhow::Result<()> {
        let gate = Gate::default();
        let backend = Arc::new(ScriptedBackend::new().with_gate(&gate));
        let session = controller(&backend);
        session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;

        let first = session.generate();
        let second = async {
            gate.entered().await;
            let status = session.status();
            let overlapping = session.auto_prompt().await;
            let edit = session.set_prompt("changed");
            gate.release();
            (status, overlapping, edit)
        };
        let (first, (status, overlapping, edit)) = tokio::join!(first, second);

        assert!(first.is_completed());
        assert_eq!(status, SessionStatus::Busy(ProgressStage::GeneratingImages));
        assert_eq!(overlapping, FlowOutcome::Rejected(Rejection::Busy));
        assert_eq!(edit, Err(Rejection::Busy));
        assert_eq!(backend.analysis_calls(), 0);
        assert_eq!(session.prompt(), "a mug");
        assert_eq!(session.history_len(), 1);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.last_notice(), None);
        Ok(())
    }

    #[tokio::test]
    async fn busy_rejection_leaves_the_notice_to_the_running_flow() -> anyhow::Result<()> {
        let gate = Gate::default();
        let backend = Arc::new(
            ScriptedBackend::new()
                .failing(BackendOperation::GenerateImages)
                .with_gate(&gate),
        );
        let session = controller(&backend);
        session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;

        let first = session.generate();
        let second = async {
            gate.entered().await;
            let overlapping = session.generate().await;
            let edit = session.apply_setting("variants", "2").err();
            let notice_in_flight = session.last_notice();
            gate.release();
            (overlapping, edit, notice_in_flight)
        };
        let (first, (overlapping, edit, notice_in_flight)) = tokio::join!(first, second);

        assert_eq!(overlapping, FlowOutcome::Rejected(Rejection::Busy));
        assert!(matches!(edit, Some(StudioError::Rejected(Rejection::Busy))));
        assert_eq!(notice_in_flight, None);
        assert_eq!(first, FlowOutcome::Failed(FailureNotice::GenerationFailed));
        assert_eq!(
            session.last_notice(),
            Some(Notice::Failed(FailureNotice::GenerationFailed))
        );
        Ok(())
    }

    #[tokio::test]
    async fn subscribers_see_busy_then_idle() -> anyhow::Result<()> {
        let gate = Gate::default();
        let backend = Arc::new(ScriptedBackend::new().with_gate(&gate));
        let session = controller(&backend);
        let mut status = session.subscribe();
        session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;

        let flow = session.generate();
        let observer = async {
            gate.entered().await;
            let seen = *status.borrow_and_update();
            gate.release();
            seen
        };
        let (_, seen) = tokio::join!(flow, observer);

        assert_eq!(seen, SessionStatus::Busy(ProgressStage::GeneratingImages));
        assert_eq!(*status.borrow_and_update(), SessionStatus::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn clear_canvas_is_idempotent_and_keeps_history() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let session = controller(&backend);
        session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;
        session.auto_prompt().await;
        session.generate().await;

        session.clear_canvas();
        let once = (
            session.references(),
            session.prompt(),
            session.swatches(),
            session.latest_images(),
        );
        session.clear_canvas();
        let twice = (
            session.references(),
            session.prompt(),
            session.swatches(),
            session.latest_images(),
        );

        assert_eq!(once, twice);
        assert!(once.0.is_empty() && once.1.is_empty() && once.2.is_empty() && once.3.is_empty());
        assert_eq!(session.history_len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn clear_during_generation_wins_over_canvas_writes() -> anyhow::Result<()> {
        let gate = Gate::default();
        let backend = Arc::new(ScriptedBackend::new().with_gate(&gate));
        let session = controller(&backend);
        session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;

        let flow = session.generate();
        let clearer = async {
            gate.entered().await;
            session.clear_canvas();
            gate.release();
        };
        let (outcome, _) = tokio::join!(flow, clearer);

        assert!(outcome.is_completed());
        assert!(session.latest_images().is_empty());
        assert_eq!(session.latest_result(), None);
        assert!(session.references().is_empty());
        assert_eq!(session.history_len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn clear_during_auto_prompt_wins_over_canvas_writes() -> anyhow::Result<()> {
        let gate = Gate::default();
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_analysis("studio shot, background #FFFFFF")
                .with_prompt("composed prompt")
                .with_gate(&gate),
        );
        let session = controller(&backend);
        session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;

        let flow = session.auto_prompt();
        let clearer = async {
            // Analysis and prompt synthesis both park on the gate.
            gate.entered().await;
            session.clear_canvas();
            gate.release();
            gate.entered().await;
            gate.release();
        };
        let (outcome, _) = tokio::join!(flow, clearer);

        assert_eq!(
            outcome.completed().map(|composed| composed.prompt),
            Some("composed prompt".to_string())
        );
        assert_eq!(session.prompt(), "");
        assert!(session.swatches().is_empty());
        assert!(session.references().is_empty());
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.last_notice(), None);
        Ok(())
    }

    #[tokio::test]
    async fn latest_result_holds_only_the_shown_images() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let backend = Arc::new(ScriptedBackend::new().with_images(&[
            "data:image/png;base64,AQID",
            "data:image/png;base64,BAUG",
            "data:image/png;base64,BwgJ",
            "data:image/png;base64,CgsM",
        ]));
        let session = controller(&backend);
        session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;
        let generated = session.generate().await.completed();

        let latest = session.latest_result();
        assert_eq!(latest.as_ref().map(|item| item.image_count), Some(1));
        assert_eq!(
            latest.as_ref().map(|item| item.id.clone()),
            generated.map(|item| item.id)
        );
        if let Some(item) = latest.as_ref() {
            let paths = crate::save_generation(item, temp.path(), session.backend_name())?;
            assert_eq!(paths.len(), session.latest_images().len());
        }

        session.apply_setting("variants", "2")?;
        assert_eq!(session.latest_result().map(|item| item.image_count), Some(2));

        session.clear_canvas();
        assert_eq!(session.latest_result(), None);
        assert_eq!(session.history()[0].image_count, 4);
        Ok(())
    }

    #[tokio::test]
    async fn edits_are_allowed_again_after_a_flow() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let session = controller(&backend);
        let id = session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;
        session.generate().await;

        let removed = session.remove_reference(&id)?;
        assert_eq!(removed.map(|image| image.file_name), Some("a.png".to_string()));
        assert_eq!(session.remove_reference(&id)?, None);
        Ok(())
    }

    #[test]
    fn invalid_setting_leaves_settings_untouched() -> anyhow::Result<()> {
        let backend = Arc::new(ScriptedBackend::new());
        let session = controller(&backend);
        let before = session.settings();

        let err = session.apply_setting("guidance", "250").err();
        assert!(matches!(err, Some(StudioError::Settings(_))));
        assert_eq!(session.settings(), before);

        let updated = session.apply_setting("variants", "2")?;
        assert_eq!(updated.variant_count, VariantCount::Two);
        assert_eq!(session.settings().variant_count, VariantCount::Two);

        let mut replaced = GenerationSettings::default();
        replaced.set_seed(Some(42));
        session.update_settings(replaced.clone())?;
        assert_eq!(session.settings(), replaced);
        Ok(())
    }

    #[tokio::test]
    async fn event_log_traces_a_generation() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let backend = Arc::new(ScriptedBackend::new());
        let session = SessionController::new(
            backend.clone(),
            EventWriter::new(&events_path, "session-2"),
        );
        session.generate().await;
        session.add_reference(reference("a.png"))?;
        session.set_prompt("a mug")?;
        session.generate().await;
        session.clear_canvas();

        assert_eq!(
            event_types(&events_path)?,
            vec![
                "session_started",
                "flow_rejected",
                "reference_added",
                "flow_started",
                "progress",
                "generation_completed",
                "canvas_cleared",
            ]
        );
        let log = std::fs::read_to_string(&events_path)?;
        assert!(!log.contains("base64"));
        Ok(())
    }
}
