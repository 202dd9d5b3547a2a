use anyhow::{anyhow, Context, Result};
use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const SINGLE_WEIGHTS: &str = "model.safetensors";
const WEIGHTS_INDEX: &str = "model.safetensors.index.json";

/// Where the summarization model comes from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// Downloaded from the Hugging Face hub into `cache_dir`.
    Hub {
        model_id: String,
        revision: String,
        cache_dir: PathBuf,
    },
    /// A snapshot directory that already holds every file.
    Local(PathBuf),
}

/// Paths of everything the pipeline needs to start.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
}

impl ModelSource {
    /// Blocking: may download several hundred megabytes on first use.
    pub fn resolve(&self) -> Result<ModelFiles> {
        match self {
            ModelSource::Local(dir) => resolve_local(dir),
            ModelSource::Hub {
                model_id,
                revision,
                cache_dir,
            } => resolve_hub(model_id, revision, cache_dir),
        }
    }
}

fn resolve_local(dir: &Path) -> Result<ModelFiles> {
    let config = require(dir, CONFIG_FILE)?;
    let tokenizer = require(dir, TOKENIZER_FILE)?;

    let single = dir.join(SINGLE_WEIGHTS);
    let weights = if single.exists() {
        vec![single]
    } else {
        let index = require(dir, WEIGHTS_INDEX)?;
        shard_paths(&index, dir)?
    };

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
    })
}

fn resolve_hub(model_id: &str, revision: &str, cache_dir: &Path) -> Result<ModelFiles> {
    info!(
        model = model_id,
        revision,
        cache_dir = %cache_dir.display(),
        "resolving model from hub"
    );

    fs::create_dir_all(cache_dir)
        .with_context(|| format!("cache dir {} is not writable", cache_dir.display()))?;

    let api = ApiBuilder::new()
        .with_cache_dir(cache_dir.to_path_buf())
        .with_progress(false)
        .build()
        .context("failed to build hub client")?;
    let repo = api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let config = fetch(&repo, model_id, CONFIG_FILE)?;
    let tokenizer = fetch(&repo, model_id, TOKENIZER_FILE)?;

    let weights = match repo.get(SINGLE_WEIGHTS) {
        Ok(path) => vec![path],
        Err(single_err) => {
            debug!(model = model_id, "no single weights file: {single_err}");
            let index = fetch(&repo, model_id, WEIGHTS_INDEX)?;
            let names = shard_names(&index)?;
            names
                .iter()
                .map(|name| fetch(&repo, model_id, name))
                .collect::<Result<Vec<_>>>()?
        }
    };

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
    })
}

fn fetch(repo: &ApiRepo, model_id: &str, file: &str) -> Result<PathBuf> {
    repo.get(file)
        .with_context(|| format!("failed to fetch {file} for {model_id}"))
}

fn require(dir: &Path, file: &str) -> Result<PathBuf> {
    let path = dir.join(file);
    if !path.exists() {
        return Err(anyhow!("{file} not found under {}", dir.display()));
    }
    Ok(path)
}

fn shard_paths(index: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(shard_names(index)?
        .into_iter()
        .map(|name| dir.join(name))
        .collect())
}

/// Distinct shard file names from a safetensors index, in stable order.
fn shard_names(index: &Path) -> Result<Vec<String>> {
    let raw = fs::read(index).with_context(|| format!("failed to read {}", index.display()))?;
    let json: serde_json::Value = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", index.display()))?;
    parse_shard_names(&json)
}

fn parse_shard_names(json: &serde_json::Value) -> Result<Vec<String>> {
    let map = json["weight_map"]
        .as_object()
        .ok_or_else(|| anyhow!("index.json: weight_map is not an object"))?;

    let names = map
        .values()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("invalid shard entry in index.json"))
        })
        .collect::<Result<BTreeSet<_>>>()?;

    if names.is_empty() {
        return Err(anyhow!("index.json lists no shards"));
    }
    Ok(names.into_iter().collect())
}
