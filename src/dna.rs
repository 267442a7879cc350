use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#?([0-9a-fA-F]{6}|[0-9a-fA-F]{3})$").expect("valid hex color regex"));

fn default_applied() -> bool {
    true
}

/// A piece of text or typography detected in the source image. Identity is
/// the positional index inside the owning [`PromptDna`]; elements are never
/// reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    pub text: String,
    pub location: String,
    pub format: String,
    pub prompt: String,
    #[serde(default = "default_applied")]
    pub applied: bool,
}

/// A distinct object detected in the source image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDetail {
    pub label: String,
    pub count: u32,
    pub description: String,
    pub prompt: String,
    #[serde(default = "default_applied")]
    pub applied: bool,
}

/// The structured analysis result ("prompt DNA") for one image. Field names
/// follow the wire format of the analysis call; the inclusion flags never
/// appear on the wire and default to true.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDna {
    pub subject: String,
    pub subject_prompt: String,
    #[serde(default = "default_applied")]
    pub subject_applied: bool,
    pub style: String,
    pub style_prompt: String,
    #[serde(default = "default_applied")]
    pub style_applied: bool,
    pub context: String,
    pub context_prompt: String,
    #[serde(default = "default_applied")]
    pub context_applied: bool,
    pub technical_details: Vec<String>,
    pub color_palette: Vec<String>,
    #[serde(default = "default_applied")]
    pub color_palette_applied: bool,
    pub text_content: Vec<TextElement>,
    pub objects: Vec<ObjectDetail>,
    pub elements_list: Vec<String>,
    #[serde(rename = "optimizedPrompt")]
    pub master_prompt: String,
}

impl PromptDna {
    /// Editable copy for a freshly activated history entry: every inclusion
    /// flag on, master prompt rederived from the field values.
    pub fn with_all_applied(&self) -> PromptDna {
        let mut dna = self.clone();
        dna.subject_applied = true;
        dna.style_applied = true;
        dna.context_applied = true;
        dna.color_palette_applied = true;
        for element in &mut dna.text_content {
            element.applied = true;
        }
        for object in &mut dna.objects {
            object.applied = true;
        }
        dna.master_prompt = synthesize(&dna);
        dna
    }
}

/// Where a mutation originated. Only contributing edits trigger a fresh
/// master-prompt derivation; a manual master edit is kept verbatim until the
/// next contributing edit overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditSource {
    Contributing,
    ManualMasterEdit,
}

/// One user intent against the active description.
#[derive(Debug, Clone)]
pub enum DnaEdit {
    SetSubjectPrompt(String),
    SetSubjectApplied(bool),
    SetStylePrompt(String),
    SetStyleApplied(bool),
    SetContextPrompt(String),
    SetContextApplied(bool),
    SetColorPalette(Vec<String>),
    SetColorPaletteApplied(bool),
    SetTextPrompt { index: usize, prompt: String },
    SetTextApplied { index: usize, applied: bool },
    SetObjectLabel { index: usize, label: String },
    SetObjectPrompt { index: usize, prompt: String },
    SetObjectApplied { index: usize, applied: bool },
    SetMasterPrompt(String),
}

impl DnaEdit {
    pub fn source(&self) -> EditSource {
        match self {
            DnaEdit::SetMasterPrompt(_) => EditSource::ManualMasterEdit,
            _ => EditSource::Contributing,
        }
    }
}

/// Derives the master prompt from the currently included sections, in fixed
/// order. Parts that are empty after trimming are dropped; the survivors are
/// joined verbatim with ". ".
pub fn synthesize(dna: &PromptDna) -> String {
    let mut parts: Vec<String> = Vec::new();
    if dna.subject_applied {
        parts.push(dna.subject_prompt.clone());
    }
    if dna.style_applied {
        parts.push(dna.style_prompt.clone());
    }
    if dna.context_applied {
        parts.push(dna.context_prompt.clone());
    }
    parts.extend(
        dna.objects
            .iter()
            .filter(|object| object.applied)
            .map(|object| object.prompt.clone()),
    );
    parts.extend(
        dna.text_content
            .iter()
            .filter(|element| element.applied)
            .map(|element| element.prompt.clone()),
    );
    if dna.color_palette_applied {
        parts.push(format!(
            "Color palette features: {}",
            dna.color_palette.join(", ")
        ));
    }
    parts.retain(|part| !part.trim().is_empty());
    parts.join(". ")
}

/// Applies one edit. Contributing edits rederive the master prompt; a manual
/// master edit stores its text as-is. Index edits outside the current lists
/// are ignored.
pub fn apply_edit(dna: &mut PromptDna, edit: DnaEdit) {
    let source = edit.source();
    match edit {
        DnaEdit::SetSubjectPrompt(value) => dna.subject_prompt = value,
        DnaEdit::SetSubjectApplied(applied) => dna.subject_applied = applied,
        DnaEdit::SetStylePrompt(value) => dna.style_prompt = value,
        DnaEdit::SetStyleApplied(applied) => dna.style_applied = applied,
        DnaEdit::SetContextPrompt(value) => dna.context_prompt = value,
        DnaEdit::SetContextApplied(applied) => dna.context_applied = applied,
        DnaEdit::SetColorPalette(palette) => dna.color_palette = palette,
        DnaEdit::SetColorPaletteApplied(applied) => dna.color_palette_applied = applied,
        DnaEdit::SetTextPrompt { index, prompt } => {
            if let Some(element) = dna.text_content.get_mut(index) {
                element.prompt = prompt;
            }
        }
        DnaEdit::SetTextApplied { index, applied } => {
            if let Some(element) = dna.text_content.get_mut(index) {
                element.applied = applied;
            }
        }
        DnaEdit::SetObjectLabel { index, label } => {
            if let Some(object) = dna.objects.get_mut(index) {
                object.label = label;
            }
        }
        DnaEdit::SetObjectPrompt { index, prompt } => {
            if let Some(object) = dna.objects.get_mut(index) {
                object.prompt = prompt;
            }
        }
        DnaEdit::SetObjectApplied { index, applied } => {
            if let Some(object) = dna.objects.get_mut(index) {
                object.applied = applied;
            }
        }
        DnaEdit::SetMasterPrompt(value) => dna.master_prompt = value,
    }
    if source == EditSource::Contributing {
        dna.master_prompt = synthesize(dna);
    }
}

/// Lowercases a palette entry and guarantees the leading `#`. Returns `None`
/// for values that are not 3- or 6-digit hex colors.
pub fn normalize_hex_color(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if !HEX_COLOR_RE.is_match(trimmed) {
        return None;
    }
    Some(format!("#{}", trimmed.trim_start_matches('#').to_lowercase()))
}
