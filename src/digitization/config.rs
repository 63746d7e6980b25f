use crate::digitization::locator::{FileType, PdfTextSuffix};
use crate::error::DigitizeError;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Every `DIGITIZE_*` variable some code path reads. `status` flags the rest
/// as typos.
pub const ENV_KEYS: &[&str] = &[
    "DIGITIZE_BUCKET",
    "DIGITIZE_CHUNK_SIZE",
    "DIGITIZE_CONFIG_PATH",
    "DIGITIZE_HOME",
    "DIGITIZE_LEGACY_STORAGE_ROOT",
    "DIGITIZE_LOG",
    "DIGITIZE_LOGS_DIR",
    "DIGITIZE_PAGE_SIZE",
    "DIGITIZE_PDF_TEXT_SUFFIX",
    "DIGITIZE_PUBLIC_URL",
    "DIGITIZE_STORE_ROOT",
    "DIGITIZE_TTL_PDF_SECS",
    "DIGITIZE_TTL_PDF_TEXT_SECS",
    "DIGITIZE_TTL_TIFF_SECS",
    "DIGITIZE_URL_BASE",
    "DIGITIZE_WORKERS",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub store_root: Option<PathBuf>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    pub url_base: String,
}

fn default_page_size() -> usize {
    1000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "cern-archives".to_string(),
            store_root: None,
            page_size: default_page_size(),
            url_base: "https://s3.cern.ch".to_string(),
        }
    }
}

/// Link lifetimes per artifact kind, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    pub pdf_secs: u64,
    pub pdf_text_secs: u64,
    pub tiff_secs: u64,
}

const ONE_YEAR_SECS: u64 = 31_556_952;

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            pdf_secs: ONE_YEAR_SECS,
            pdf_text_secs: ONE_YEAR_SECS,
            tiff_secs: 5 * ONE_YEAR_SECS,
        }
    }
}

impl TtlConfig {
    pub fn for_type(&self, file_type: FileType) -> u64 {
        match file_type {
            FileType::Pdf => self.pdf_secs,
            FileType::PdfText => self.pdf_text_secs,
            FileType::TiffSet => self.tiff_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default)]
    pub pdf_text_suffix: PdfTextSuffix,
    pub workers: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            pdf_text_suffix: PdfTextSuffix::Plain,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyConfig {
    pub storage_root: PathBuf,
    pub public_url: String,
    #[serde(default = "default_backup_prefix")]
    pub backup_prefix: String,
    #[serde(default = "default_probe_file")]
    pub probe_file: String,
}

fn default_backup_prefix() -> String {
    "original_".to_string()
}

fn default_probe_file() -> String {
    "test.xml".to_string()
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(
                "/eos/project-p/psdigitization/public/CERN-Project-Files/CERN-Project-Files/www",
            ),
            public_url: "https://digitization.web.cern.ch".to_string(),
            backup_prefix: default_backup_prefix(),
            probe_file: default_probe_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectConfig {
    pub chunk_size: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self { chunk_size: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DigitizeConfig {
    pub storage: StorageConfig,
    pub ttl: TtlConfig,
    pub import: ImportConfig,
    pub legacy: LegacyConfig,
    pub collect: CollectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialDigitizeConfig {
    storage: Option<StorageConfig>,
    ttl: Option<TtlConfig>,
    import: Option<ImportConfig>,
    legacy: Option<LegacyConfig>,
    collect: Option<CollectConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional_path(var: &str, fallback: Option<PathBuf>) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => fallback,
    }
}

fn env_or_suffix(var: &str, fallback: PdfTextSuffix) -> PdfTextSuffix {
    match env::var(var) {
        Ok(v) => PdfTextSuffix::parse(&v).unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn validate(cfg: &DigitizeConfig) -> Result<()> {
    if cfg.storage.bucket.trim().is_empty() {
        return Err(anyhow!("invalid storage bucket: cannot be empty"));
    }
    if cfg.storage.page_size == 0 {
        return Err(anyhow!("invalid storage page size: must be >= 1"));
    }
    if cfg.storage.url_base.trim().is_empty() {
        return Err(anyhow!("invalid storage url base: cannot be empty"));
    }
    if cfg.ttl.pdf_secs == 0 || cfg.ttl.pdf_text_secs == 0 || cfg.ttl.tiff_secs == 0 {
        return Err(anyhow!("invalid url ttl: every file type needs ttl >= 1 second"));
    }
    if cfg.import.workers == 0 {
        return Err(anyhow!("invalid import workers: must be >= 1"));
    }
    if cfg.legacy.public_url.trim().is_empty() {
        return Err(anyhow!("invalid legacy public url: cannot be empty"));
    }
    if cfg.legacy.backup_prefix.is_empty() {
        return Err(anyhow!("invalid legacy backup prefix: cannot be empty"));
    }
    if cfg.collect.chunk_size == 0 {
        return Err(anyhow!("invalid collection chunk size: must be >= 1"));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("DIGITIZE_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".digitize").join("digitize.toml"))
}

fn apply_partial(base: &mut DigitizeConfig, raw: &str) -> Result<()> {
    let parsed: PartialDigitizeConfig =
        toml::from_str(raw).map_err(|err| DigitizeError::InvalidConfig(err.to_string()))?;
    if let Some(storage) = parsed.storage {
        base.storage = storage;
    }
    if let Some(ttl) = parsed.ttl {
        base.ttl = ttl;
    }
    if let Some(import) = parsed.import {
        base.import = import;
    }
    if let Some(legacy) = parsed.legacy {
        base.legacy = legacy;
    }
    if let Some(collect) = parsed.collect {
        base.collect = collect;
    }
    Ok(())
}

fn merge_file_config(base: &mut DigitizeConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    apply_partial(base, &raw)
        .map_err(|err| anyhow!("failed to parse digitize config {}: {err}", path.display()))
}

pub fn load_config() -> Result<DigitizeConfig> {
    let mut cfg = DigitizeConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.storage.bucket = env_or_string("DIGITIZE_BUCKET", &cfg.storage.bucket);
    cfg.storage.store_root = env_or_optional_path("DIGITIZE_STORE_ROOT", cfg.storage.store_root);
    cfg.storage.page_size = env_or_usize("DIGITIZE_PAGE_SIZE", cfg.storage.page_size);
    cfg.storage.url_base = env_or_string("DIGITIZE_URL_BASE", &cfg.storage.url_base);
    cfg.ttl.pdf_secs = env_or_u64("DIGITIZE_TTL_PDF_SECS", cfg.ttl.pdf_secs);
    cfg.ttl.pdf_text_secs = env_or_u64("DIGITIZE_TTL_PDF_TEXT_SECS", cfg.ttl.pdf_text_secs);
    cfg.ttl.tiff_secs = env_or_u64("DIGITIZE_TTL_TIFF_SECS", cfg.ttl.tiff_secs);
    cfg.import.pdf_text_suffix =
        env_or_suffix("DIGITIZE_PDF_TEXT_SUFFIX", cfg.import.pdf_text_suffix);
    cfg.import.workers = env_or_usize("DIGITIZE_WORKERS", cfg.import.workers);
    if let Some(root) = env_or_optional_path("DIGITIZE_LEGACY_STORAGE_ROOT", None) {
        cfg.legacy.storage_root = root;
    }
    cfg.legacy.public_url = env_or_string("DIGITIZE_PUBLIC_URL", &cfg.legacy.public_url);
    cfg.collect.chunk_size = env_or_usize("DIGITIZE_CHUNK_SIZE", cfg.collect.chunk_size);

    validate(&cfg)?;
    Ok(cfg)
}

fn unknown_keys_in(keys: impl Iterator<Item = String>, allowlist: &[&str]) -> Vec<String> {
    let mut out = keys
        .filter(|key| key.starts_with("DIGITIZE_"))
        .filter(|key| !allowlist.contains(&key.as_str()))
        .collect::<Vec<_>>();
    out.sort();
    out
}

/// `DIGITIZE_*` variables set in the environment that no code path reads.
pub fn unknown_env_keys() -> Vec<String> {
    unknown_keys_in(env::vars().map(|(k, _)| k), ENV_KEYS)
}
