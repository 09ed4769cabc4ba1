//! Workload descriptors staged to temp files for `run <path>`.

use std::io::Write;
use std::path::{Path, PathBuf};

use drill_exec::Release;
use tempfile::NamedTempFile;
use tracing::debug;

/// A descriptor written verbatim to a uniquely named temp file.
///
/// The file is removed on release or drop.
#[derive(Debug)]
pub struct StagedWorkload {
    path: PathBuf,
    file: Option<NamedTempFile>,
}

impl StagedWorkload {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn stage_workload(name: &str, descriptor: &str) -> std::io::Result<StagedWorkload> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("drill-{}-", sanitize(name)))
        .tempfile()?;
    file.write_all(descriptor.as_bytes())?;
    file.flush()?;

    let path = file.path().to_path_buf();
    debug!(workload = name, path = %path.display(), "descriptor staged");
    Ok(StagedWorkload {
        path,
        file: Some(file),
    })
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

impl Release for StagedWorkload {
    fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        if let Err(err) = file.close() {
            debug!(path = %self.path.display(), error = %err, "removing staged descriptor failed");
        }
    }

    fn label(&self) -> String {
        format!("workload file {}", self.path.display())
    }
}
