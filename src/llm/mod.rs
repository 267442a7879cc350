pub mod gemini;

pub use gemini::{analyze_image, generate_image, AnalysisError, GenerationError};
