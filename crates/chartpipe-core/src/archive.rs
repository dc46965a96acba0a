//! Chart archive (`.tgz`) packing and extraction

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::chart::CHART_FILE;
use crate::error::{CoreError, Result};

/// Extract a gzipped chart archive into `dest`
///
/// Returns the chart root: `dest` itself when `Chart.yaml` sits at the top
/// of the archive, otherwise the single top-level directory holding it.
pub fn extract_chart_archive(data: &[u8], dest: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest)?;

    let mut archive = Archive::new(GzDecoder::new(data));
    archive.unpack(dest).map_err(|e| CoreError::InvalidArchive {
        message: format!("failed to unpack into {}: {}", dest.display(), e),
    })?;

    find_chart_root(dest)
}

/// Extract a `.tgz` file from disk
pub fn extract_chart_file(archive_path: &Path, dest: &Path) -> Result<PathBuf> {
    let data = std::fs::read(archive_path)?;
    extract_chart_archive(&data, dest)
}

fn find_chart_root(dest: &Path) -> Result<PathBuf> {
    if dest.join(CHART_FILE).exists() {
        return Ok(dest.to_path_buf());
    }

    let mut roots: Vec<PathBuf> = std::fs::read_dir(dest)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join(CHART_FILE).exists())
        .collect();

    match roots.len() {
        1 => Ok(roots.remove(0)),
        0 => Err(CoreError::InvalidArchive {
            message: format!("no {} found in archive", CHART_FILE),
        }),
        n => Err(CoreError::InvalidArchive {
            message: format!("archive contains {} charts, expected one", n),
        }),
    }
}

/// Package a chart directory as a gzipped tarball under `<dirname>/`
pub fn package_chart(chart_dir: &Path) -> Result<Vec<u8>> {
    if !chart_dir.join(CHART_FILE).exists() {
        return Err(CoreError::InvalidChart {
            message: format!("{} not found in {}", CHART_FILE, chart_dir.display()),
        });
    }

    let prefix = chart_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| CoreError::InvalidChart {
            message: format!("cannot package {}", chart_dir.display()),
        })?;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.append_dir_all(&prefix, chart_dir)?;
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}
