use anyhow::Result;

use crate::commands::{CommandReport, record_audit};
use crate::digitization::config::{load_config, unknown_env_keys};
use crate::digitization::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_id={}", env!("BUILD_ID")));
    report.detail(format!("digitize_home={}", paths.home.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));

    match load_config() {
        Ok(cfg) => {
            report.detail(format!("storage.bucket={}", cfg.storage.bucket));
            match &cfg.storage.store_root {
                Some(root) => {
                    report.detail(format!("storage.store_root={}", root.display()));
                    if !root.join(&cfg.storage.bucket).is_dir() {
                        report.issue(format!(
                            "bucket directory missing: {}",
                            root.join(&cfg.storage.bucket).display()
                        ));
                    }
                }
                None => report.issue("no object store configured (DIGITIZE_STORE_ROOT)"),
            }
            report.detail(format!("storage.page_size={}", cfg.storage.page_size));
            report.detail(format!("storage.url_base={}", cfg.storage.url_base));
            report.detail(format!("ttl.pdf_secs={}", cfg.ttl.pdf_secs));
            report.detail(format!("ttl.pdf_text_secs={}", cfg.ttl.pdf_text_secs));
            report.detail(format!("ttl.tiff_secs={}", cfg.ttl.tiff_secs));
            report.detail(format!(
                "import.pdf_text_suffix={}",
                cfg.import.pdf_text_suffix.as_str()
            ));
            report.detail(format!("import.workers={}", cfg.import.workers));
            report.detail(format!(
                "legacy.storage_root={}",
                cfg.legacy.storage_root.display()
            ));
            report.detail(format!("legacy.public_url={}", cfg.legacy.public_url));
            report.detail(format!("collect.chunk_size={}", cfg.collect.chunk_size));
        }
        Err(err) => report.issue(format!("config invalid: {err:#}")),
    }

    for key in unknown_env_keys() {
        report.issue(format!("unknown environment variable {key} is ignored"));
    }

    record_audit(&paths, &report);
    Ok(report)
}
