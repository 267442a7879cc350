use std::error::Error;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use tracing::{error, info, warn};

mod config;
mod dna;
mod language;
mod llm;
mod media;
mod overrides;
mod session;
mod utils;
mod visualize;

use config::CONFIG;
use dna::{normalize_hex_color, DnaEdit, PromptDna};
use language::Language;
use llm::gemini;
use media::ImageAsset;
use overrides::{
    is_valid_aspect_ratio, lens_option, style_preset, ASPECT_RATIO_OPTIONS, DEFAULT_ASPECT_RATIO,
    LENS_OPTIONS, NONE_PRESET_ID, STYLE_PRESETS,
};
use session::queue::QueueStatus;
use session::Session;
use utils::logging::init_logging;
use visualize::{palette_art_prompt, visualize_components, COMPONENT_ASPECT_RATIO};

#[derive(Debug)]
struct AnalyzeArgs {
    images: Vec<PathBuf>,
    language: Language,
    edits: Vec<DnaEdit>,
    style_id: String,
    lens_id: String,
    aspect_ratio: String,
    negative_prompt: String,
    generate: Option<PathBuf>,
    components_dir: Option<PathBuf>,
    palette_art: Option<PathBuf>,
    json: bool,
}

fn usage() -> &'static str {
    "Usage: vision_prompt_lab analyze --image <path> [--image <path> ...] \
     [--lang <en|vi|zh|ja|th>] [--drop <section>]... [--set <section>=<text>]... \
     [--master <text>] [--style <preset>] [--lens <lens>] [--aspect <ratio>] \
     [--negative <text>] [--generate <file>] [--components-dir <dir>] \
     [--palette-art <file>] [--json]"
}

// Sections addressed by --drop and --set: subject, style, context, palette,
// object:<n>, object-label:<n>, text:<n> (1-based positions).

fn parse_position(number: &str, value: &str) -> Result<usize> {
    number
        .parse::<usize>()
        .ok()
        .filter(|position| *position > 0)
        .map(|position| position - 1)
        .ok_or_else(|| anyhow!("Invalid position in {value} (expected a 1-based number)"))
}

/// Maps a `--drop` value to the inclusion toggle it switches off.
fn parse_drop_target(value: &str) -> Result<DnaEdit> {
    let lowered = value.trim().to_lowercase();
    match lowered.as_str() {
        "subject" => return Ok(DnaEdit::SetSubjectApplied(false)),
        "style" => return Ok(DnaEdit::SetStyleApplied(false)),
        "context" => return Ok(DnaEdit::SetContextApplied(false)),
        "palette" => return Ok(DnaEdit::SetColorPaletteApplied(false)),
        _ => {}
    }
    if let Some(number) = lowered.strip_prefix("object:") {
        return Ok(DnaEdit::SetObjectApplied {
            index: parse_position(number, value)?,
            applied: false,
        });
    }
    if let Some(number) = lowered.strip_prefix("text:") {
        return Ok(DnaEdit::SetTextApplied {
            index: parse_position(number, value)?,
            applied: false,
        });
    }
    Err(anyhow!(
        "Unknown --drop value: {value} (expected subject, style, context, palette, object:<n> or text:<n>)"
    ))
}

/// Maps a `--set` assignment to the field edit it performs.
fn parse_set_assignment(value: &str) -> Result<DnaEdit> {
    let (target, text) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid --set value: {value} (expected <section>=<text>)"))?;
    let text = text.to_string();
    let lowered = target.trim().to_lowercase();
    match lowered.as_str() {
        "subject" => return Ok(DnaEdit::SetSubjectPrompt(text)),
        "style" => return Ok(DnaEdit::SetStylePrompt(text)),
        "context" => return Ok(DnaEdit::SetContextPrompt(text)),
        "palette" => {
            let palette = text
                .split(',')
                .map(|color| color.trim().to_string())
                .filter(|color| !color.is_empty())
                .collect();
            return Ok(DnaEdit::SetColorPalette(palette));
        }
        _ => {}
    }
    if let Some(number) = lowered.strip_prefix("object-label:") {
        return Ok(DnaEdit::SetObjectLabel {
            index: parse_position(number, value)?,
            label: text,
        });
    }
    if let Some(number) = lowered.strip_prefix("object:") {
        return Ok(DnaEdit::SetObjectPrompt {
            index: parse_position(number, value)?,
            prompt: text,
        });
    }
    if let Some(number) = lowered.strip_prefix("text:") {
        return Ok(DnaEdit::SetTextPrompt {
            index: parse_position(number, value)?,
            prompt: text,
        });
    }
    Err(anyhow!(
        "Unknown --set target: {value} (expected subject, style, context, palette, object:<n>, object-label:<n> or text:<n>)"
    ))
}

fn preset_ids(presets: &[overrides::PresetOption]) -> String {
    presets
        .iter()
        .map(|preset| preset.id)
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_analyze_args(args: &[String]) -> Result<Option<AnalyzeArgs>> {
    if args.get(1).map(|value| value.as_str()) != Some("analyze") {
        return Ok(None);
    }

    let mut images: Vec<PathBuf> = Vec::new();
    let mut language = Language::default();
    let mut edits: Vec<DnaEdit> = Vec::new();
    let mut style_id = NONE_PRESET_ID.to_string();
    let mut lens_id = NONE_PRESET_ID.to_string();
    let mut aspect_ratio = DEFAULT_ASPECT_RATIO.to_string();
    let mut negative_prompt = String::new();
    let mut generate = None;
    let mut components_dir = None;
    let mut palette_art = None;
    let mut json = false;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--image" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --image"))?;
                images.push(PathBuf::from(value));
            }
            "--lang" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --lang"))?;
                language = Language::from_code(value).ok_or_else(|| {
                    anyhow!("Unknown --lang value: {value} (expected en, vi, zh, ja or th)")
                })?;
            }
            "--drop" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --drop"))?;
                edits.push(parse_drop_target(value)?);
            }
            "--set" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --set"))?;
                edits.push(parse_set_assignment(value)?);
            }
            "--master" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --master"))?;
                edits.push(DnaEdit::SetMasterPrompt(value.clone()));
            }
            "--style" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --style"))?;
                style_preset(value).ok_or_else(|| {
                    anyhow!(
                        "Unknown --style value: {value}. Options: {}",
                        preset_ids(&STYLE_PRESETS)
                    )
                })?;
                style_id = value.clone();
            }
            "--lens" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --lens"))?;
                lens_option(value).ok_or_else(|| {
                    anyhow!(
                        "Unknown --lens value: {value}. Options: {}",
                        preset_ids(&LENS_OPTIONS)
                    )
                })?;
                lens_id = value.clone();
            }
            "--aspect" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --aspect"))?;
                if !is_valid_aspect_ratio(value) {
                    return Err(anyhow!(
                        "Invalid --aspect value: {value}. Options: {}",
                        ASPECT_RATIO_OPTIONS.join(", ")
                    ));
                }
                aspect_ratio = value.clone();
            }
            "--negative" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --negative"))?;
                negative_prompt = value.clone();
            }
            "--generate" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --generate"))?;
                generate = Some(PathBuf::from(value));
            }
            "--components-dir" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --components-dir"))?;
                components_dir = Some(PathBuf::from(value));
            }
            "--palette-art" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --palette-art"))?;
                palette_art = Some(PathBuf::from(value));
            }
            "--json" => {
                json = true;
            }
            "--help" | "-h" => {
                return Err(anyhow!(usage()));
            }
            other => {
                return Err(anyhow!("Unknown analyze argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    if images.is_empty() {
        return Err(anyhow!("At least one --image is required\n{}", usage()));
    }

    Ok(Some(AnalyzeArgs {
        images,
        language,
        edits,
        style_id,
        lens_id,
        aspect_ratio,
        negative_prompt,
        generate,
        components_dir,
        palette_art,
        json,
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    let _guards = init_logging();

    let args: Vec<String> = std::env::args().collect();
    let Some(run_args) = parse_analyze_args(&args)? else {
        return Err(usage().into());
    };

    if CONFIG.gemini_api_key.trim().is_empty() {
        return Err("GEMINI_API_KEY is required".into());
    }

    run_analyze(run_args).await?;
    Ok(())
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let mut session = Session::new(args.language);
    for path in &args.images {
        let asset = ImageAsset::from_file(path).await?;
        let preview = asset.preview();
        let id = session.submit(asset);
        match preview {
            Some(preview) => info!(
                "Queued {} ({}x{}) as entry {id}",
                path.display(),
                preview.width,
                preview.height
            ),
            None => info!("Queued {} as entry {id}", path.display()),
        }
    }

    session.process_queue(gemini::analyze_image).await;

    if let Some(banner) = session.last_error() {
        error!("{banner}");
    }
    for entry in session.queue().entries() {
        if entry.status == QueueStatus::Errored {
            warn!("Entry {} failed analysis and stays in the queue", entry.id);
        }
    }

    if session.history().is_empty() {
        return Err(anyhow!("No image produced an analysis result"));
    }
    for entry in session.history() {
        info!(
            "History entry {} ({} bytes) analyzed at {}",
            entry.id,
            entry.asset.bytes().len(),
            entry.created_at.to_rfc3339()
        );
    }

    // Edits land on the active (newest) entry, in the order given.
    for edit in args.edits {
        session.edit(edit);
    }

    let overrides = session.overrides_mut();
    overrides.style_id = args.style_id;
    overrides.lens_id = args.lens_id;
    overrides.aspect_ratio = args.aspect_ratio;
    overrides.negative_prompt = args.negative_prompt;

    if let Some(preset) = style_preset(&session.overrides().style_id) {
        if preset.id != NONE_PRESET_ID {
            info!("Style override armed: {}", preset.label);
        }
    }
    if let Some(lens) = lens_option(&session.overrides().lens_id) {
        if lens.id != NONE_PRESET_ID {
            info!("Lens override armed: {}", lens.label);
        }
    }

    let dna = session
        .active()
        .ok_or_else(|| anyhow!("No active analysis result"))?
        .clone();
    print_report(&dna, args.json)?;

    if let Some(path) = &args.generate {
        let prompt = session
            .generation_prompt()
            .ok_or_else(|| anyhow!("No active analysis result"))?;
        info!(
            "Generating master image at {} aspect ratio",
            session.overrides().aspect_ratio
        );
        match gemini::generate_image(prompt, session.overrides().aspect_ratio.clone()).await {
            Ok(image) => {
                tokio::fs::write(path, &image)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Saved generated image to {}", path.display());
            }
            Err(err) => error!("{err}"),
        }
    }

    if let Some(dir) = &args.components_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let report = visualize_components(&dna, gemini::generate_image).await;
        for rendered in &report.rendered {
            let file = dir.join(format!("{}.png", sanitize_file_stem(&rendered.id)));
            tokio::fs::write(&file, &rendered.image)
                .await
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!("Saved {} to {}", rendered.label, file.display());
        }
        for failure in &report.failures {
            warn!("{} was skipped: {}", failure.label, failure.error);
        }
    }

    if let Some(path) = &args.palette_art {
        let prompt = palette_art_prompt(&dna.color_palette);
        match gemini::generate_image(prompt, COMPONENT_ASPECT_RATIO.to_string()).await {
            Ok(image) => {
                tokio::fs::write(path, &image)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Saved palette art to {}", path.display());
            }
            Err(err) => error!("{err}"),
        }
    }

    Ok(())
}

fn print_report(dna: &PromptDna, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(dna)?);
        return Ok(());
    }

    println!("Subject: {}", dna.subject);
    println!("  prompt: {}", dna.subject_prompt);
    println!("Style: {}", dna.style);
    println!("  prompt: {}", dna.style_prompt);
    println!("Environment: {}", dna.context);
    println!("  prompt: {}", dna.context_prompt);

    if !dna.technical_details.is_empty() {
        println!("Technical details: {}", dna.technical_details.join("; "));
    }

    let palette: Vec<String> = dna
        .color_palette
        .iter()
        .map(|color| normalize_hex_color(color).unwrap_or_else(|| color.clone()))
        .collect();
    println!("Color palette: {}", palette.join(", "));

    for (index, element) in dna.text_content.iter().enumerate() {
        println!(
            "Text {}: \"{}\" ({}, {})",
            index + 1,
            element.text,
            element.location,
            element.format
        );
        println!("  prompt: {}", element.prompt);
    }
    for (index, object) in dna.objects.iter().enumerate() {
        println!(
            "Object {}: {} x{} - {}",
            index + 1,
            object.label,
            object.count,
            object.description
        );
        println!("  prompt: {}", object.prompt);
    }
    if !dna.elements_list.is_empty() {
        println!("Elements: {}", dna.elements_list.join(", "));
    }

    println!();
    println!("Master prompt:");
    println!("{}", dna.master_prompt);
    Ok(())
}

fn sanitize_file_stem(value: &str) -> String {
    let mut stem: String = value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    stem.truncate(60);
    if stem.trim_matches('-').is_empty() {
        "component".to_string()
    } else {
        stem
    }
}
