/// A named prompt modifier selectable at generation time. The `none` entry of
/// each table contributes nothing.
#[derive(Debug, Clone, Copy)]
pub struct PresetOption {
    pub id: &'static str,
    pub label: &'static str,
    pub modifier: &'static str,
}

pub const STYLE_PRESETS: [PresetOption; 8] = [
    PresetOption {
        id: "none",
        label: "None",
        modifier: "",
    },
    PresetOption {
        id: "photorealistic",
        label: "Photorealistic",
        modifier: "highly detailed photorealistic 8k, unreal engine 5 render, ray tracing",
    },
    PresetOption {
        id: "cinematic",
        label: "Cinematic",
        modifier: "cinematic lighting, dramatic shadows, anamorphic lens flares, film grain, epic atmosphere",
    },
    PresetOption {
        id: "anime",
        label: "Anime",
        modifier: "studio ghibli style, vibrant colors, detailed anime art, cel shaded",
    },
    PresetOption {
        id: "minimalist",
        label: "Minimalist",
        modifier: "modern minimalist style, clean lines, plenty of whitespace, simple composition",
    },
    PresetOption {
        id: "vintage",
        label: "Vintage",
        modifier: "vintage film aesthetic, retro color grading, faded edges, nostalgic feel, classic photography",
    },
    PresetOption {
        id: "neon",
        label: "Neon / Cyberpunk",
        modifier: "vibrant neon glow, electric colors, cyberpunk night aesthetic, high contrast luminescence",
    },
    PresetOption {
        id: "watercolor",
        label: "Watercolor",
        modifier: "delicate watercolor painting, soft fluid brushstrokes, hand-painted textures, artistic paint bleeds",
    },
];

pub const LENS_OPTIONS: [PresetOption; 7] = [
    PresetOption {
        id: "none",
        label: "Default",
        modifier: "",
    },
    PresetOption {
        id: "35mm",
        label: "35mm Street",
        modifier: "shot on 35mm lens, street photography aesthetic, slight distortion, candid feel",
    },
    PresetOption {
        id: "50mm",
        label: "50mm Prime",
        modifier: "shot on 50mm prime lens, natural field of view, crisp details",
    },
    PresetOption {
        id: "85mm",
        label: "85mm Portrait",
        modifier: "shot on 85mm f/1.8 lens, shallow depth of field, beautiful bokeh, portrait photography",
    },
    PresetOption {
        id: "macro",
        label: "Macro",
        modifier: "macro photography, extreme close-up, incredible detail, shallow depth of field",
    },
    PresetOption {
        id: "wide",
        label: "Wide Angle",
        modifier: "wide angle lens, expansive view, epic scale, dynamic composition",
    },
    PresetOption {
        id: "fisheye",
        label: "Fisheye",
        modifier: "fisheye lens, strong barrel distortion, stylized circular view",
    },
];

pub const ASPECT_RATIO_OPTIONS: [&str; 5] = ["1:1", "16:9", "9:16", "4:3", "3:4"];
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";
pub const NONE_PRESET_ID: &str = "none";

pub fn style_preset(id: &str) -> Option<&'static PresetOption> {
    STYLE_PRESETS.iter().find(|preset| preset.id == id)
}

pub fn lens_option(id: &str) -> Option<&'static PresetOption> {
    LENS_OPTIONS.iter().find(|lens| lens.id == id)
}

pub fn is_valid_aspect_ratio(value: &str) -> bool {
    ASPECT_RATIO_OPTIONS.contains(&value)
}

/// Transient generation-time settings. Never persisted, never written back
/// into the stored description; reset to defaults whenever a new history
/// entry becomes active.
#[derive(Debug, Clone)]
pub struct CreativeOverrides {
    pub style_id: String,
    pub lens_id: String,
    pub aspect_ratio: String,
    pub negative_prompt: String,
}

impl Default for CreativeOverrides {
    fn default() -> Self {
        CreativeOverrides {
            style_id: NONE_PRESET_ID.to_string(),
            lens_id: NONE_PRESET_ID.to_string(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            negative_prompt: String::new(),
        }
    }
}

/// Text actually sent to the generation call: base master prompt, then the
/// style clause, then the lens clause, then the negative-constraints clause.
/// The aspect ratio travels as a separate request parameter, never as text.
pub fn compose_final_prompt(base: &str, overrides: &CreativeOverrides) -> String {
    let mut prompt = base.to_string();

    if overrides.style_id != NONE_PRESET_ID {
        if let Some(preset) = style_preset(&overrides.style_id) {
            prompt.push_str(&format!(". Style override: {}", preset.modifier));
        }
    }

    if overrides.lens_id != NONE_PRESET_ID {
        if let Some(lens) = lens_option(&overrides.lens_id) {
            prompt.push_str(&format!(". Lens properties: {}", lens.modifier));
        }
    }

    if !overrides.negative_prompt.trim().is_empty() {
        prompt.push_str(&format!(" Avoid and exclude: {}.", overrides.negative_prompt));
    }

    prompt
}
