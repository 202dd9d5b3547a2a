use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::inference::loader::ModelLoader;
use crate::inference::{GenerationParams, Summarizer};

pub const EMPTY_INPUT_WARNING: &str = "Please paste article text before summarizing.";

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("{}", EMPTY_INPUT_WARNING)]
    EmptyInput,

    #[error("model failed to load: {0}")]
    ModelLoad(String),

    #[error("{0}")]
    Invocation(String),
}

/// What the page shows after a submission. Exactly one variant per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SummaryOutcome {
    Summary(String),
    Warning(String),
    Error(String),
}

impl From<Result<String, SummarizeError>> for SummaryOutcome {
    fn from(result: Result<String, SummarizeError>) -> Self {
        match result {
            Ok(summary) => SummaryOutcome::Summary(summary),
            Err(e @ SummarizeError::EmptyInput) => SummaryOutcome::Warning(e.to_string()),
            Err(e) => SummaryOutcome::Error(e.to_string()),
        }
    }
}

/// Blank input is rejected before the model is touched; anything else makes
/// exactly one model call.
pub async fn summarize_text(
    loader: &Arc<ModelLoader>,
    text: &str,
    params: &GenerationParams,
) -> Result<String, SummarizeError> {
    if text.trim().is_empty() {
        return Err(SummarizeError::EmptyInput);
    }

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("summarize", %request_id, bytes = text.len());

    async move {
        let model = loader
            .get()
            .await
            .map_err(|e| SummarizeError::ModelLoad(format!("{e:#}")))?;

        let text = text.to_string();
        let params = params.clone();
        let started = std::time::Instant::now();
        let result = tokio::task::spawn_blocking(move || model.summarize(&text, &params))
            .await
            .map_err(|e| SummarizeError::Invocation(format!("summarizer task failed: {e}")))?;

        match result {
            Ok(summary) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    summary_bytes = summary.len(),
                    "summary generated"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!("summarization failed: {e:#}");
                Err(SummarizeError::Invocation(format!("{e:#}")))
            }
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::testing::FakeSummarizer;
    use anyhow::anyhow;

    fn loader_with(fake: Arc<FakeSummarizer>) -> Arc<ModelLoader> {
        Arc::new(ModelLoader::new(move || Ok(fake.clone() as Arc<dyn Summarizer>)))
    }

    #[tokio::test]
    async fn blank_input_never_reaches_the_model() {
        let fake = Arc::new(FakeSummarizer::default());
        let loader = loader_with(fake.clone());
        let params = GenerationParams::default();

        for input in ["", "   ", "\n\t  \n"] {
            let outcome: SummaryOutcome = summarize_text(&loader, input, &params).await.into();
            assert_eq!(outcome, SummaryOutcome::Warning(EMPTY_INPUT_WARNING.to_string()));
        }

        assert_eq!(fake.call_count(), 0);
        assert_eq!(loader.build_attempts(), 0);
    }

    #[tokio::test]
    async fn each_submission_calls_the_model_once() {
        let fake = Arc::new(FakeSummarizer::default());
        let loader = loader_with(fake.clone());
        let params = GenerationParams::default();

        for n in 1..=3 {
            let outcome: SummaryOutcome =
                summarize_text(&loader, "Markets rallied today.", &params)
                    .await
                    .into();
            assert_eq!(
                outcome,
                SummaryOutcome::Summary("summary: Markets rallied today.".into())
            );
            assert_eq!(fake.call_count(), n);
        }
        assert_eq!(loader.build_attempts(), 1);
    }

    #[tokio::test]
    async fn model_failure_becomes_error_outcome() {
        let fake = Arc::new(FakeSummarizer::failing("sequence too long"));
        let loader = loader_with(fake.clone());

        let outcome: SummaryOutcome =
            summarize_text(&loader, "text", &GenerationParams::default())
                .await
                .into();
        assert_eq!(outcome, SummaryOutcome::Error("sequence too long".into()));
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn load_failure_becomes_error_outcome() {
        let loader = Arc::new(ModelLoader::new(|| Err(anyhow!("disk full"))));

        let result = summarize_text(&loader, "text", &GenerationParams::default()).await;
        match result {
            Err(SummarizeError::ModelLoad(msg)) => assert!(msg.contains("disk full")),
            other => panic!("expected load failure, got {other:?}"),
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn span_records_input_size_in_bytes() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let loader = loader_with(Arc::new(FakeSummarizer::default()));
        // 11 chars, 13 bytes.
        summarize_text(&loader, "héllo wörld", &GenerationParams::default())
            .await
            .unwrap();

        let logs = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("summary generated"), "{logs}");
        assert!(logs.contains("bytes=13"), "{logs}");
    }
}
