//! JSON and CSV balance artifacts.
//!
//! For label `polygon` the sink writes `balances_polygon.json`, an object
//! mapping checksummed address to decimal balance string, and
//! `balances_polygon.csv` with an `Address,Balance` header. Both files are
//! written atomically (temp file + rename).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use holder_snapshot::{Balance, BoxError, SnapshotSink};

/// CSV header row.
pub const CSV_HEADER: &str = "Address,Balance";

/// [`SnapshotSink`] writing into a directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Write artifacts into `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the JSON artifact for `label`.
    #[must_use]
    pub fn json_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("balances_{label}.json"))
    }

    /// Path of the CSV artifact for `label`.
    #[must_use]
    pub fn csv_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!("balances_{label}.csv"))
    }

    fn write_all(&self, label: &str, balances: &BTreeMap<Address, Balance>) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let json_path = self.json_path(label);
        write_atomic(&json_path, &render_json(balances)?)?;

        let csv_path = self.csv_path(label);
        write_atomic(&csv_path, &render_csv(balances))?;

        tracing::info!(
            json = %json_path.display(),
            csv = %csv_path.display(),
            rows = balances.len(),
            "balances saved"
        );
        Ok(())
    }
}

impl SnapshotSink for FileSink {
    fn write(&self, label: &str, balances: &BTreeMap<Address, Balance>) -> Result<(), BoxError> {
        self.write_all(label, balances).map_err(Into::into)
    }
}

/// Render balances as a pretty-printed JSON object of decimal strings.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render_json(balances: &BTreeMap<Address, Balance>) -> Result<String> {
    let doc: BTreeMap<String, String> = balances
        .iter()
        .map(|(addr, bal)| (addr.to_checksum(None), bal.to_string()))
        .collect();
    serde_json::to_string_pretty(&doc).context("serializing balances")
}

/// Render balances as `Address,Balance` rows joined by `\n`.
#[must_use]
pub fn render_csv(balances: &BTreeMap<Address, Balance>) -> String {
    let mut lines = Vec::with_capacity(balances.len() + 1);
    lines.push(CSV_HEADER.to_owned());
    lines.extend(
        balances
            .iter()
            .map(|(addr, bal)| format!("{},{bal}", addr.to_checksum(None))),
    );
    lines.join("\n")
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} → {}", tmp.display(), path.display()))?;
    Ok(())
}
