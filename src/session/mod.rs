pub mod queue;

use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::dna::{self, DnaEdit, PromptDna};
use crate::language::Language;
use crate::llm::gemini::AnalysisError;
use crate::media::ImageAsset;
use crate::overrides::{compose_final_prompt, CreativeOverrides, DEFAULT_ASPECT_RATIO, NONE_PRESET_ID};
use self::queue::{EntryId, QueueEffect, QueueEvent, UploadQueue};

/// The single session-wide banner shown when an analysis fails.
pub const ANALYSIS_ERROR_BANNER: &str =
    "Failed to analyze image. Please ensure your API key is valid and the image is not too large.";

/// A completed analysis. `analysis` is the pristine remote result; the
/// editable working copy lives in [`Session::active`] and is rebuilt on every
/// activation, so the original stays available for reset.
#[derive(Debug)]
pub struct HistoryEntry {
    pub id: EntryId,
    pub created_at: DateTime<Utc>,
    pub asset: ImageAsset,
    pub analysis: PromptDna,
}

/// All in-memory state of one interactive session, threaded explicitly
/// through every operation. Single-writer: mutations happen only between the
/// suspension points of the remote calls.
pub struct Session {
    queue: UploadQueue,
    history: Vec<HistoryEntry>,
    active_id: Option<EntryId>,
    active: Option<PromptDna>,
    overrides: CreativeOverrides,
    last_error: Option<String>,
    language: Language,
    pending_analyze: Option<EntryId>,
}

impl Session {
    pub fn new(language: Language) -> Self {
        Session {
            queue: UploadQueue::new(),
            history: Vec::new(),
            active_id: None,
            active: None,
            overrides: CreativeOverrides::default(),
            last_error: None,
            language,
            pending_analyze: None,
        }
    }

    /// Enqueues one image for analysis. The queue drains automatically; the
    /// resulting effect is held until [`Session::process_queue`] runs.
    pub fn submit(&mut self, asset: ImageAsset) -> EntryId {
        let (id, effect) = self.queue.enqueue(asset);
        if let Some(QueueEffect::Analyze(next)) = effect {
            self.pending_analyze = Some(next);
        }
        self.last_error = None;
        id
    }

    /// The scheduling loop: execute at most one analysis effect, feed the
    /// outcome back into the queue, repeat until no work remains. Successes
    /// become history entries (newest first) and auto-activate; failures mark
    /// the entry errored and set the session error banner. Generic over the
    /// analysis call so the loop runs under test without the network.
    pub async fn process_queue<F, Fut>(&mut self, mut analyze: F)
    where
        F: FnMut(Vec<u8>, String, Language) -> Fut,
        Fut: Future<Output = Result<PromptDna, AnalysisError>>,
    {
        loop {
            let id = match self.pending_analyze.take() {
                Some(id) => id,
                None => match self.queue.drain() {
                    Some(QueueEffect::Analyze(id)) => id,
                    _ => break,
                },
            };

            let Some(entry) = self.queue.get(id) else {
                continue;
            };
            let bytes = entry.asset.bytes().to_vec();
            let mime_type = entry.asset.mime_type().to_string();

            match analyze(bytes, mime_type, self.language).await {
                Ok(analysis) => {
                    if let Some(QueueEffect::Promoted(entry)) =
                        self.queue.apply(QueueEvent::Completed(id))
                    {
                        info!("Analysis complete for entry {}", entry.id);
                        self.history.insert(
                            0,
                            HistoryEntry {
                                id: entry.id,
                                created_at: Utc::now(),
                                asset: entry.asset,
                                analysis,
                            },
                        );
                        self.select_entry(id);
                    }
                }
                Err(err) => {
                    warn!("Analysis failed for entry {id}: {err}");
                    self.last_error = Some(ANALYSIS_ERROR_BANNER.to_string());
                    if let Some(QueueEffect::Analyze(next)) =
                        self.queue.apply(QueueEvent::Failed(id))
                    {
                        self.pending_analyze = Some(next);
                    }
                }
            }
        }
    }

    /// Activates a history entry: fresh editable copy with every inclusion
    /// flag on and a freshly synthesized master prompt, overrides back to
    /// defaults. Edits made to the previously active entry are discarded.
    pub fn select_entry(&mut self, id: EntryId) -> bool {
        let Some(entry) = self.history.iter().find(|entry| entry.id == id) else {
            return false;
        };
        self.active = Some(entry.analysis.with_all_applied());
        self.active_id = Some(id);
        self.overrides = CreativeOverrides::default();
        true
    }

    /// Applies one edit to the active description. Returns false when no
    /// entry is active.
    pub fn edit(&mut self, edit: DnaEdit) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        dna::apply_edit(active, edit);
        true
    }

    /// Restores the active description from the original analysis: all flags
    /// on, field edits and manual master edits discarded. Style, lens and
    /// aspect ratio go back to defaults; the negative-constraints text is
    /// deliberately kept.
    pub fn reset_active(&mut self) -> bool {
        let Some(id) = self.active_id else {
            return false;
        };
        let Some(entry) = self.history.iter().find(|entry| entry.id == id) else {
            return false;
        };
        self.active = Some(entry.analysis.with_all_applied());
        self.overrides.style_id = NONE_PRESET_ID.to_string();
        self.overrides.lens_id = NONE_PRESET_ID.to_string();
        self.overrides.aspect_ratio = DEFAULT_ASPECT_RATIO.to_string();
        true
    }

    /// The text for the next generation call: active master prompt plus the
    /// current overrides. The stored master prompt itself is never mutated.
    pub fn generation_prompt(&self) -> Option<String> {
        let active = self.active.as_ref()?;
        Some(compose_final_prompt(&active.master_prompt, &self.overrides))
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn active(&self) -> Option<&PromptDna> {
        self.active.as_ref()
    }

    pub fn active_id(&self) -> Option<EntryId> {
        self.active_id
    }

    pub fn overrides(&self) -> &CreativeOverrides {
        &self.overrides
    }

    pub fn overrides_mut(&mut self) -> &mut CreativeOverrides {
        &mut self.overrides
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::queue::QueueStatus;
    use super::*;
    use crate::dna::{ObjectDetail, TextElement};

    fn asset(fill: u8) -> ImageAsset {
        ImageAsset::from_bytes(vec![fill; 16])
    }

    fn analysis(subject_prompt: &str) -> PromptDna {
        PromptDna {
            subject: subject_prompt.to_uppercase(),
            subject_prompt: subject_prompt.to_string(),
            subject_applied: true,
            style: String::new(),
            style_prompt: "soft studio light".to_string(),
            style_applied: true,
            context: String::new(),
            context_prompt: String::new(),
            context_applied: true,
            technical_details: Vec::new(),
            color_palette: vec!["#102030".to_string()],
            color_palette_applied: true,
            text_content: vec![TextElement {
                text: "SALE".to_string(),
                location: "center".to_string(),
                format: "bold".to_string(),
                prompt: "the word SALE in bold type".to_string(),
                applied: true,
            }],
            objects: vec![ObjectDetail {
                label: "mug".to_string(),
                count: 2,
                description: "ceramic mugs".to_string(),
                prompt: "two ceramic mugs".to_string(),
                applied: true,
            }],
            elements_list: Vec::new(),
            master_prompt: "model-synthesized".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_entries_are_promoted_newest_first_and_activated() {
        let mut session = Session::new(Language::En);
        let first = session.submit(asset(1));
        let second = session.submit(asset(2));

        let mut seen = Vec::new();
        session
            .process_queue(|bytes, _mime, _lang| {
                seen.push(bytes[0]);
                let subject = format!("image {}", bytes[0]);
                async move { Ok(analysis(&subject)) }
            })
            .await;

        assert_eq!(seen, vec![1, 2], "analysis runs in enqueue order");
        assert!(session.queue().entries().is_empty());
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[0].id, second, "newest entry first");
        assert_eq!(session.history()[1].id, first);
        assert_eq!(session.active_id(), Some(second));
        assert!(session.last_error().is_none());

        // Activation rebuilt the master prompt locally instead of keeping the
        // model's own synthesis.
        let active = session.active().expect("active entry");
        assert!(active.master_prompt.starts_with("image 2. soft studio light"));
    }

    #[tokio::test]
    async fn failed_analysis_marks_entry_errored_and_sets_the_banner() {
        let mut session = Session::new(Language::En);
        let id = session.submit(asset(7));

        session
            .process_queue(|_bytes, _mime, _lang| async {
                Err(AnalysisError("empty payload".to_string()))
            })
            .await;

        let entry = session.queue().get(id).expect("entry stays visible");
        assert_eq!(entry.status, QueueStatus::Errored);
        assert!(session.history().is_empty());
        assert!(session.active().is_none());
        assert_eq!(session.last_error(), Some(ANALYSIS_ERROR_BANNER));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_later_entries() {
        let mut session = Session::new(Language::En);
        let first = session.submit(asset(1));
        let second = session.submit(asset(2));

        session
            .process_queue(|bytes, _mime, _lang| async move {
                if bytes[0] == 1 {
                    Err(AnalysisError("boom".to_string()))
                } else {
                    Ok(analysis("survivor"))
                }
            })
            .await;

        assert_eq!(
            session.queue().get(first).map(|entry| entry.status),
            Some(QueueStatus::Errored)
        );
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].id, second);
        assert_eq!(session.active_id(), Some(second));
        assert_eq!(session.last_error(), Some(ANALYSIS_ERROR_BANNER));
    }

    #[tokio::test]
    async fn switching_entries_resets_edits_flags_and_overrides() {
        let mut session = Session::new(Language::En);
        let first = session.submit(asset(1));
        session.submit(asset(2));
        session
            .process_queue(|bytes, _mime, _lang| {
                let subject = format!("image {}", bytes[0]);
                async move { Ok(analysis(&subject)) }
            })
            .await;

        session.edit(DnaEdit::SetStyleApplied(false));
        session.overrides_mut().style_id = "anime".to_string();
        session.overrides_mut().negative_prompt = "blurry".to_string();

        assert!(session.select_entry(first));
        let active = session.active().expect("active entry");
        assert!(active.style_applied, "flags come back on");
        assert!(active.master_prompt.starts_with("image 1"));
        assert_eq!(session.overrides().style_id, NONE_PRESET_ID);
        assert!(session.overrides().negative_prompt.is_empty());
    }

    #[tokio::test]
    async fn reset_restores_the_original_analysis_but_keeps_negative_text() {
        let mut session = Session::new(Language::En);
        session.submit(asset(5));
        session
            .process_queue(|_bytes, _mime, _lang| async { Ok(analysis("original subject")) })
            .await;

        session.edit(DnaEdit::SetSubjectPrompt("edited subject".to_string()));
        session.edit(DnaEdit::SetMasterPrompt("manual master".to_string()));
        session.overrides_mut().style_id = "vintage".to_string();
        session.overrides_mut().negative_prompt = "text artifacts".to_string();

        assert!(session.reset_active());
        let active = session.active().expect("active entry");
        assert_eq!(active.subject_prompt, "original subject");
        assert!(active.master_prompt.starts_with("original subject"));
        assert_eq!(session.overrides().style_id, NONE_PRESET_ID);
        assert_eq!(session.overrides().negative_prompt, "text artifacts");
    }

    #[tokio::test]
    async fn generation_prompt_layers_overrides_without_touching_the_master() {
        let mut session = Session::new(Language::En);
        session.submit(asset(3));
        session
            .process_queue(|_bytes, _mime, _lang| async { Ok(analysis("a quiet street")) })
            .await;

        session.overrides_mut().negative_prompt = "people".to_string();
        let master = session.active().expect("active").master_prompt.clone();
        let prompt = session.generation_prompt().expect("prompt");
        assert!(prompt.starts_with(&master));
        assert!(prompt.ends_with("Avoid and exclude: people."));
        assert_eq!(session.active().expect("active").master_prompt, master);
    }

    #[test]
    fn edits_without_an_active_entry_are_rejected() {
        let mut session = Session::new(Language::En);
        assert!(!session.edit(DnaEdit::SetSubjectApplied(false)));
        assert!(!session.reset_active());
        assert!(session.generation_prompt().is_none());
    }
}
