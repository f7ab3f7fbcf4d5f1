use crate::report::{sha256_hex, Download};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
pub const BUNDLE_FORMAT_V1: &str = "marksplit-reports-v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    pub file_name: String,
    pub category: String,
    pub rows: usize,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub format: String,
    pub version: u32,
    pub app_version: String,
    pub exported_at: String,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

/// Writes every download plus `manifest.json` into one zip at `out_path`.
pub fn export_report_bundle(downloads: &[Download], out_path: &Path) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = BundleManifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        version: 1,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        files: downloads
            .iter()
            .map(|d| ManifestFile {
                file_name: d.file_name().to_string(),
                category: d.category.key().to_string(),
                rows: d.rows,
                bytes: d.bytes.len(),
                sha256: d.sha256.clone(),
            })
            .collect(),
    };
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for d in downloads {
        zip.start_file(d.file_name(), opts)
            .with_context(|| format!("failed to start entry {}", d.file_name()))?;
        zip.write_all(&d.bytes)
            .with_context(|| format!("failed to write entry {}", d.file_name()))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    log::info!(
        "exported {} reports to {}",
        downloads.len(),
        out_path.to_string_lossy()
    );
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: downloads.len() + 1,
    })
}

/// Reads `manifest.json` back and checks every listed report against its
/// recorded size and digest.
pub fn verify_report_bundle(path: &Path) -> anyhow::Result<BundleManifest> {
    let f = File::open(path)
        .with_context(|| format!("failed to open bundle {}", path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(f).context("invalid zip archive")?;

    let mut text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut text)
        .context("failed to read manifest.json")?;
    let manifest: BundleManifest =
        serde_json::from_str(&text).context("manifest.json is invalid JSON")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    for file in &manifest.files {
        let mut bytes = Vec::new();
        archive
            .by_name(&file.file_name)
            .with_context(|| format!("bundle missing {}", file.file_name))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read {}", file.file_name))?;
        if bytes.len() != file.bytes || sha256_hex(&bytes) != file.sha256 {
            return Err(anyhow!("{} does not match its manifest entry", file.file_name));
        }
    }
    Ok(manifest)
}
