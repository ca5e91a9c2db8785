use super::EngineResult;

/// Voice synthesis of plain text.
pub trait TextToSpeechEngine: Send + Sync {
    /// Render `text` with the named voice and return the encoded audio.
    fn synthesize(&self, text: &str, voice_id: &str, output_format: &str) -> EngineResult<Vec<u8>>;
}
