use std::future::Future;

use tracing::{info, warn};

use crate::dna::PromptDna;
use crate::llm::gemini::GenerationError;

/// Per-item renders and the palette composition always use a square frame.
pub const COMPONENT_ASPECT_RATIO: &str = "1:1";

/// One visualizable component of the description: a text element or an
/// object. Inclusion flags are ignored here — the sweep covers everything.
#[derive(Debug, Clone)]
pub struct ComponentItem {
    pub id: String,
    pub label: String,
    pub prompt: String,
}

#[derive(Debug)]
pub struct RenderedComponent {
    pub id: String,
    pub label: String,
    pub image: Vec<u8>,
}

#[derive(Debug)]
pub struct ComponentFailure {
    pub label: String,
    pub error: GenerationError,
}

/// Outcome of a bulk sweep: the renders that succeeded, in item order, and
/// the failures that were skipped over.
#[derive(Debug, Default)]
pub struct VisualizationReport {
    pub rendered: Vec<RenderedComponent>,
    pub failures: Vec<ComponentFailure>,
}

pub fn component_items(dna: &PromptDna) -> Vec<ComponentItem> {
    let mut items = Vec::new();
    for element in &dna.text_content {
        items.push(ComponentItem {
            id: format!("text-{}", element.text),
            label: format!("Text: {}", element.text),
            prompt: element.prompt.clone(),
        });
    }
    for (index, object) in dna.objects.iter().enumerate() {
        items.push(ComponentItem {
            id: format!("obj-{index}"),
            label: format!("Object: {}", object.label),
            prompt: object.prompt.clone(),
        });
    }
    items
}

/// Renders every component of the description, strictly one call at a time.
/// Individual failures are logged and collected, never aborting the sweep, so
/// partial results survive. There is no cancellation: the sweep always runs
/// the full list.
pub async fn visualize_components<F, Fut>(dna: &PromptDna, mut generate: F) -> VisualizationReport
where
    F: FnMut(String, String) -> Fut,
    Fut: Future<Output = Result<Vec<u8>, GenerationError>>,
{
    let items = component_items(dna);
    info!("Visualizing {} component(s)", items.len());

    let mut report = VisualizationReport::default();
    for item in items {
        match generate(item.prompt.clone(), COMPONENT_ASPECT_RATIO.to_string()).await {
            Ok(image) => report.rendered.push(RenderedComponent {
                id: item.id,
                label: item.label,
                image,
            }),
            Err(error) => {
                warn!("Component visualization failed for {}: {}", item.label, error);
                report.failures.push(ComponentFailure {
                    label: item.label,
                    error,
                });
            }
        }
    }
    report
}

/// The color-palette-only abstract composition prompt.
pub fn palette_art_prompt(palette: &[String]) -> String {
    format!(
        "An abstract digital art piece with clean geometric shapes, adhering strictly to this palette: {}.",
        palette.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dna::{ObjectDetail, TextElement};

    fn dna_with(objects: Vec<ObjectDetail>, text: Vec<TextElement>) -> PromptDna {
        PromptDna {
            subject: String::new(),
            subject_prompt: String::new(),
            subject_applied: true,
            style: String::new(),
            style_prompt: String::new(),
            style_applied: true,
            context: String::new(),
            context_prompt: String::new(),
            context_applied: true,
            technical_details: Vec::new(),
            color_palette: vec!["#0e7490".to_string(), "#fde68a".to_string()],
            color_palette_applied: true,
            text_content: text,
            objects,
            elements_list: Vec::new(),
            master_prompt: String::new(),
        }
    }

    fn object(label: &str, applied: bool) -> ObjectDetail {
        ObjectDetail {
            label: label.to_string(),
            count: 1,
            description: String::new(),
            prompt: format!("render of {label}"),
            applied,
        }
    }

    #[test]
    fn items_list_text_elements_before_objects_and_ignore_flags() {
        let dna = dna_with(
            vec![object("lamp", false)],
            vec![TextElement {
                text: "OPEN".to_string(),
                location: String::new(),
                format: String::new(),
                prompt: "neon OPEN sign".to_string(),
                applied: false,
            }],
        );
        let items = component_items(&dna);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "text-OPEN");
        assert_eq!(items[0].label, "Text: OPEN");
        assert_eq!(items[1].id, "obj-0");
        assert_eq!(items[1].label, "Object: lamp");
    }

    #[tokio::test]
    async fn a_mid_sweep_failure_skips_only_that_item() {
        let dna = dna_with(
            vec![object("first", true), object("second", true), object("third", true)],
            Vec::new(),
        );

        let mut calls = Vec::new();
        let report = visualize_components(&dna, |prompt, aspect| {
            assert_eq!(aspect, "1:1");
            calls.push(prompt.clone());
            let fail = prompt.contains("second");
            async move {
                if fail {
                    Err(GenerationError("quota".to_string()))
                } else {
                    Ok(prompt.into_bytes())
                }
            }
        })
        .await;

        assert_eq!(calls.len(), 3, "the sweep always runs the full list");
        assert_eq!(report.rendered.len(), 2);
        assert_eq!(report.rendered[0].label, "Object: first");
        assert_eq!(report.rendered[1].label, "Object: third");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].label, "Object: second");
    }

    #[test]
    fn palette_prompt_joins_the_colors() {
        let dna = dna_with(Vec::new(), Vec::new());
        assert_eq!(
            palette_art_prompt(&dna.color_palette),
            "An abstract digital art piece with clean geometric shapes, adhering strictly to \
             this palette: #0e7490, #fde68a."
        );
    }
}
