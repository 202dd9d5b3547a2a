pub mod hub;
pub mod loader;
pub mod t5;

use anyhow::Result;

/// Bounds handed to the model on every call.
///
/// Lengths count decoder tokens including the decoder start token.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_length: usize,
    pub min_length: usize,
    pub do_sample: bool,
    pub temperature: f64,
    pub seed: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: 250,
            min_length: 80,
            do_sample: false,
            temperature: 1.0,
            seed: 299_792_458,
        }
    }
}

impl GenerationParams {
    /// `None` selects argmax decoding.
    pub fn sampling_temperature(&self) -> Option<f64> {
        self.do_sample.then_some(self.temperature)
    }
}

/// A tokenizer and seq2seq model wrapped into one callable.
///
/// Calls are blocking and CPU bound; async callers go through
/// `tokio::task::spawn_blocking`.
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    fn summarize(&self, text: &str, params: &GenerationParams) -> Result<String>;
}
