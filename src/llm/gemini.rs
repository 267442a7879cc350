use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::dna::PromptDna;
use crate::language::Language;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, thiserror::Error)]
#[error("Image analysis failed: {0}")]
pub struct AnalysisError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("Image generation failed: {0}")]
pub struct GenerationError(pub String);

// No automatic retry on either call: a failed analysis leaves its queue entry
// errored, a failed generation surfaces inline. The request timeout is the
// only recovery mechanism.
const MODEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

fn redact_api_key(text: &str) -> String {
    let key = CONFIG.gemini_api_key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

fn summarize_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for candidate in candidates {
        let Some(parts) = candidate
            .content
            .as_ref()
            .and_then(|content| content.parts.as_ref())
        else {
            continue;
        };
        for part in parts {
            match part {
                GeminiPart::Text { text } => {
                    text_parts += 1;
                    if text_preview.is_none() && !text.trim().is_empty() {
                        text_preview = Some(truncate_for_log(text, 200));
                    }
                }
                GeminiPart::InlineData { inline_data } => {
                    if inline_data.mime_type.starts_with("image/") {
                        image_parts += 1;
                    }
                }
            }
        }
    }

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}

fn extract_text(response: GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(content) = candidate.content {
            for part in content.parts.unwrap_or_default() {
                if let GeminiPart::Text { text } = part {
                    if !text.trim().is_empty() {
                        text_parts.push(text);
                    }
                }
            }
        }
    }
    text_parts.join("\n")
}

fn extract_images(response: GeminiResponse) -> Vec<Vec<u8>> {
    let mut images = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(content) = candidate.content {
            for part in content.parts.unwrap_or_default() {
                if let GeminiPart::InlineData { inline_data } = part {
                    if inline_data.mime_type.starts_with("image/") {
                        if let Ok(bytes) = general_purpose::STANDARD.decode(inline_data.data) {
                            images.push(bytes);
                        }
                    }
                }
            }
        }
    }
    images
}

fn analysis_instruction(language: Language) -> String {
    format!(
        "Reverse-engineer this image for a generative AI prompt.\n\
         Output Language: Provide all descriptive fields (subject, style, context, descriptions) in {target}.\n\
         IMPORTANT: All '*Prompt' fields (subjectPrompt, stylePrompt, contextPrompt, optimizedPrompt) MUST remain in ENGLISH for compatibility with image generators.\n\
         \n\
         Required:\n\
         1. PRIMARY SUBJECT (subject, subjectPrompt)\n\
         2. DESIGN STYLE (style, stylePrompt)\n\
         3. ENVIRONMENT (context, contextPrompt)\n\
         4. TEXT/TYPOGRAPHY (textContent array with text, location, format, prompt)\n\
         5. OBJECTS (objects array with label, count, description, prompt)\n\
         6. COLOR MAPPING (colorPalette array)\n\
         7. MASTER SYNTHESIS (optimizedPrompt)\n\
         \n\
         Return as JSON.",
        target = language.english_name()
    )
}

fn analysis_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "subject": { "type": "STRING" },
            "subjectPrompt": { "type": "STRING" },
            "context": { "type": "STRING" },
            "contextPrompt": { "type": "STRING" },
            "style": { "type": "STRING" },
            "stylePrompt": { "type": "STRING" },
            "technicalDetails": { "type": "ARRAY", "items": { "type": "STRING" } },
            "colorPalette": { "type": "ARRAY", "items": { "type": "STRING" } },
            "textContent": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "text": { "type": "STRING" },
                        "location": { "type": "STRING" },
                        "format": { "type": "STRING" },
                        "prompt": { "type": "STRING" }
                    },
                    "required": ["text", "location", "format", "prompt"]
                }
            },
            "objects": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "label": { "type": "STRING" },
                        "count": { "type": "INTEGER" },
                        "description": { "type": "STRING" },
                        "prompt": { "type": "STRING" }
                    },
                    "required": ["label", "count", "description", "prompt"]
                }
            },
            "elementsList": { "type": "ARRAY", "items": { "type": "STRING" } },
            "optimizedPrompt": { "type": "STRING" }
        },
        "required": [
            "subject", "subjectPrompt", "context", "contextPrompt", "style", "stylePrompt",
            "technicalDetails", "colorPalette", "textContent", "objects", "elementsList",
            "optimizedPrompt"
        ]
    })
}

fn build_analysis_payload(image_bytes: &[u8], mime_type: &str, language: Language) -> Value {
    let encoded = general_purpose::STANDARD.encode(image_bytes);
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": mime_type,
                        "data": encoded
                    }
                },
                { "text": analysis_instruction(language) }
            ]
        }],
        "generationConfig": {
            "maxOutputTokens": CONFIG.gemini_max_output_tokens,
            "responseMimeType": "application/json",
            "responseSchema": analysis_response_schema()
        }
    })
}

fn build_image_config(aspect_ratio: &str) -> Option<Value> {
    let trimmed = aspect_ratio.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(json!({ "aspectRatio": trimmed }))
}

fn build_generation_payload(prompt: &str, aspect_ratio: &str) -> Value {
    let mut generation_config = json!({
        "responseModalities": ["TEXT", "IMAGE"]
    });
    if let Some(image_config) = build_image_config(aspect_ratio) {
        if let Some(config_object) = generation_config.as_object_mut() {
            config_object.insert("imageConfig".to_string(), image_config);
        }
    }

    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }],
        "generationConfig": generation_config
    })
}

async fn call_gemini_api(model: &str, payload: Value) -> Result<GeminiResponse> {
    let client = get_http_client();
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
        model, CONFIG.gemini_api_key
    );

    let response = client
        .post(&url)
        .timeout(MODEL_REQUEST_TIMEOUT)
        .json(&payload)
        .send()
        .await
        .map_err(|err| anyhow!("Gemini request failed: {}", redact_api_key(&err.to_string())))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (message, body_summary) = summarize_error_body(&body);
        warn!("Gemini API error: status={}, body={}", status, body_summary);
        let detail = message.unwrap_or(body_summary);
        return Err(anyhow!(
            "Gemini request failed with status {}: {}",
            status,
            detail
        ));
    }

    let value = response.json::<GeminiResponse>().await?;
    if tracing::enabled!(tracing::Level::DEBUG) {
        debug!(target: "llm.gemini", model = model, response = %summarize_response(&value));
    }
    Ok(value)
}

/// Sends the image to the analysis model and parses the structured result.
/// Any failure — transport, HTTP, empty response, or a response that does not
/// match the schema — is a total [`AnalysisError`].
pub async fn analyze_image(
    image_bytes: Vec<u8>,
    mime_type: String,
    language: Language,
) -> Result<PromptDna, AnalysisError> {
    let payload = build_analysis_payload(&image_bytes, &mime_type, language);
    let model = CONFIG.gemini_analysis_model.clone();

    let text = log_llm_timing(
        "gemini",
        &model,
        "analyze_image",
        Some(json!({ "mimeType": mime_type, "language": language.code() })),
        || async {
            let response = call_gemini_api(&model, payload).await?;
            Ok(extract_text(response))
        },
    )
    .await
    .map_err(|err| AnalysisError(err.to_string()))?;

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError(format!(
            "no response from the analysis model ({model})"
        )));
    }

    serde_json::from_str::<PromptDna>(trimmed)
        .map_err(|err| AnalysisError(format!("unparseable analysis response: {err}")))
}

/// Asks the image model for a new image. The aspect ratio is a request
/// parameter, never part of the prompt text. Returns the first image payload.
pub async fn generate_image(
    prompt: String,
    aspect_ratio: String,
) -> Result<Vec<u8>, GenerationError> {
    let payload = build_generation_payload(&prompt, &aspect_ratio);
    let model = CONFIG.gemini_image_model.clone();

    let response = log_llm_timing(
        "gemini",
        &model,
        "generate_image",
        Some(json!({ "aspectRatio": aspect_ratio })),
        || async { call_gemini_api(&model, payload).await },
    )
    .await
    .map_err(|err| GenerationError(err.to_string()))?;

    let mut images = extract_images(response);
    if images.is_empty() {
        return Err(GenerationError(format!(
            "no image returned by the model ({model})"
        )));
    }
    Ok(images.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_parts_and_skips_blanks() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "   " },
                        { "text": "{\"ok\":true}" }
                    ]
                }
            }]
        }))
        .expect("valid response json");
        assert_eq!(extract_text(response), "{\"ok\":true}");
    }

    #[test]
    fn extracts_inline_image_data() {
        let encoded = general_purpose::STANDARD.encode(b"fake-image");
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": encoded } },
                        { "inlineData": { "mimeType": "audio/mp3", "data": "eHg=" } }
                    ]
                }
            }]
        }))
        .expect("valid response json");
        let images = extract_images(response);
        assert_eq!(images, vec![b"fake-image".to_vec()]);
    }

    #[test]
    fn wire_format_deserializes_into_dna_with_flags_on() {
        let raw = json!({
            "subject": "A lighthouse",
            "subjectPrompt": "a white lighthouse on a cliff",
            "context": "Stormy coast",
            "contextPrompt": "on a stormy coastline at dusk",
            "style": "Oil painting",
            "stylePrompt": "impressionist oil painting",
            "technicalDetails": ["visible brush strokes"],
            "colorPalette": ["#1a2b3c", "#ffffff"],
            "textContent": [
                { "text": "NORD", "location": "base", "format": "stencil", "prompt": "the word NORD stenciled" }
            ],
            "objects": [
                { "label": "lighthouse", "count": 1, "description": "tall tower", "prompt": "one tall lighthouse" }
            ],
            "elementsList": ["lighthouse", "waves"],
            "optimizedPrompt": "a white lighthouse on a stormy coastline"
        })
        .to_string();

        let dna: PromptDna = serde_json::from_str(&raw).expect("wire format parses");
        assert!(dna.subject_applied && dna.style_applied && dna.context_applied);
        assert!(dna.color_palette_applied);
        assert!(dna.text_content[0].applied);
        assert!(dna.objects[0].applied);
        assert_eq!(dna.master_prompt, "a white lighthouse on a stormy coastline");
    }

    #[test]
    fn missing_required_fields_fail_to_parse() {
        let raw = json!({ "subject": "A lighthouse" }).to_string();
        assert!(serde_json::from_str::<PromptDna>(&raw).is_err());
    }

    #[test]
    fn error_body_summary_prefers_the_api_message() {
        let (message, _) = summarize_error_body(
            r#"{"error": {"code": 400, "message": "Invalid JSON payload"}}"#,
        );
        assert_eq!(message.as_deref(), Some("Invalid JSON payload"));

        let (message, summary) = summarize_error_body("");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn generation_payload_omits_blank_aspect_ratio() {
        let payload = build_generation_payload("a lake", "  ");
        assert!(payload.pointer("/generationConfig/imageConfig").is_none());

        let payload = build_generation_payload("a lake", "16:9");
        assert_eq!(
            payload
                .pointer("/generationConfig/imageConfig/aspectRatio")
                .and_then(Value::as_str),
            Some("16:9")
        );
    }
}
