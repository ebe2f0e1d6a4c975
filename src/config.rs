use std::env;

/// Fallback LLM model when none is specified.
pub const DEFAULT_MODEL: &str = "google/gemini-3-flash-preview";

/// Returns the model to use, checking the explicit value first, then the
/// `MODEL_NAME` environment variable, and finally the default.
pub fn resolve_model(model: Option<&str>) -> String {
    if let Some(m) = model {
        if !m.is_empty() {
            return m.to_string();
        }
    }
    if let Ok(m) = env::var("MODEL_NAME") {
        if !m.is_empty() {
            return m;
        }
    }
    DEFAULT_MODEL.to_string()
}
