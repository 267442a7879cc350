/// Target languages supported by the analysis call. Descriptive fields come
/// back in the selected language; all `*Prompt` fields stay in English for
/// compatibility with image generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    En,
    Vi,
    Zh,
    Ja,
    Th,
}

impl Language {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "en" => Some(Language::En),
            "vi" => Some(Language::Vi),
            "zh" => Some(Language::Zh),
            "ja" => Some(Language::Ja),
            "th" => Some(Language::Th),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Vi => "vi",
            Language::Zh => "zh",
            Language::Ja => "ja",
            Language::Th => "th",
        }
    }

    pub fn english_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Vi => "Vietnamese",
            Language::Zh => "Chinese (Simplified)",
            Language::Ja => "Japanese",
            Language::Th => "Thai",
        }
    }
}
