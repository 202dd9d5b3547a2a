use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use super::hub::ModelSource;
use super::t5::{parse_device_preference, T5Summarizer};
use super::Summarizer;
use crate::config::AppConfig;

type Factory = dyn Fn() -> Result<Arc<dyn Summarizer>> + Send + Sync;

/// Builds the summarization pipeline at most once per process.
///
/// A failed build is not memoized; the next caller tries again.
pub struct ModelLoader {
    cell: OnceCell<Arc<dyn Summarizer>>,
    factory: Box<Factory>,
    builds: AtomicUsize,
}

impl ModelLoader {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Summarizer>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(factory),
            builds: AtomicUsize::new(0),
        }
    }

    /// Loader for the configured T5 model.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let source = match &cfg.model_dir {
            Some(dir) => ModelSource::Local(dir.clone()),
            None => ModelSource::Hub {
                model_id: cfg.model_id.clone(),
                revision: cfg.revision.clone(),
                cache_dir: cfg.cache_dir.clone(),
            },
        };
        let device = cfg.device.clone();
        let name = cfg.model_label();
        let max_input_tokens = cfg.max_input_tokens;

        Self::new(move || {
            let files = source.resolve()?;
            let device = parse_device_preference(&device)?;
            let model = T5Summarizer::load(name.clone(), &files, device, max_input_tokens)?;
            Ok(Arc::new(model) as Arc<dyn Summarizer>)
        })
    }

    /// Blocking; concurrent callers wait for the single in-flight build.
    pub fn get_blocking(&self) -> Result<Arc<dyn Summarizer>> {
        self.cell
            .get_or_try_init(|| {
                let attempt = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
                info!(attempt, "initializing summarization engine");
                (self.factory)().map_err(|e| {
                    error!(attempt, "summarization engine failed to load: {e:#}");
                    e
                })
            })
            .map(Arc::clone)
    }

    pub async fn get(self: &Arc<Self>) -> Result<Arc<dyn Summarizer>> {
        if let Some(model) = self.cell.get() {
            return Ok(model.clone());
        }
        let loader = self.clone();
        tokio::task::spawn_blocking(move || loader.get_blocking())
            .await
            .map_err(|e| anyhow!("model loader task failed: {e}"))?
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Number of times the factory has run, successful or not.
    pub fn build_attempts(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}
