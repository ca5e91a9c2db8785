use super::EngineResult;

/// Machine translation of plain text.
pub trait TranslationEngine: Send + Sync {
    fn translate(&self, text: &str, source_language: &str, target_language: &str)
        -> EngineResult<String>;
}
