//! Reference frame preparation.
//!
//! The service only accepts a reference image whose pixel dimensions match
//! the requested clip size exactly, so every frame handed over by the
//! operator is decoded, flattened to RGB, force-resized and re-encoded as
//! PNG into a temporary file before upload.

use crate::resolution::{Resolution, ResolutionError};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("reference {path}: {source}")]
    Resolution {
        path: PathBuf,
        #[source]
        source: ResolutionError,
    },

    #[error("reference {path} does not exist or is not a file")]
    Missing { path: PathBuf },

    #[error("reference {path} could not be decoded (target {width}x{height})")]
    Decode {
        path: PathBuf,
        width: u32,
        height: u32,
        #[source]
        source: image::ImageError,
    },

    #[error("reference {path} could not be encoded at {width}x{height}")]
    Encode {
        path: PathBuf,
        width: u32,
        height: u32,
        #[source]
        source: image::ImageError,
    },

    #[error("reference {path}: failed to write temporary copy at {width}x{height}")]
    Io {
        path: PathBuf,
        width: u32,
        height: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("reference {path}: preparation task aborted")]
    Aborted { path: PathBuf },
}

/// A PNG copy of a reference frame sized for one submission.
///
/// The temporary file is deleted when the asset is dropped.
#[derive(Debug)]
pub struct ReferenceAsset {
    file: TempPath,
    source: PathBuf,
    resolution: Resolution,
    resized: bool,
}

impl ReferenceAsset {
    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn resized(&self) -> bool {
        self.resized
    }

    /// Name used for the upload; the extension drives the content type.
    pub fn file_name(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reference.png".to_string())
    }

    pub fn mime_type(&self) -> &'static str {
        "image/png"
    }
}

/// Synchronous core of [`prepare`].
pub fn prepare_blocking(
    path: &Path,
    size: &str,
    scratch_dir: Option<&Path>,
) -> Result<ReferenceAsset, PrepareError> {
    let target: Resolution = size.parse().map_err(|source| PrepareError::Resolution {
        path: path.to_path_buf(),
        source,
    })?;
    let (width, height) = (target.width, target.height);

    if let Some(limit) = image::Limits::default().max_alloc {
        if u64::from(width) * u64::from(height) * 3 > limit {
            return Err(PrepareError::Resolution {
                path: path.to_path_buf(),
                source: ResolutionError::TooLarge(target, limit),
            });
        }
    }

    if !path.is_file() {
        return Err(PrepareError::Missing {
            path: path.to_path_buf(),
        });
    }

    let decoded = ImageReader::open(path)
        .map_err(|source| PrepareError::Io {
            path: path.to_path_buf(),
            width,
            height,
            source,
        })?
        .with_guessed_format()
        .map_err(|source| PrepareError::Io {
            path: path.to_path_buf(),
            width,
            height,
            source,
        })?
        .decode()
        .map_err(|source| PrepareError::Decode {
            path: path.to_path_buf(),
            width,
            height,
            source,
        })?;

    let rgb = decoded.to_rgb8();
    let resized = rgb.dimensions() != (width, height);
    let rgb: RgbImage = if resized {
        tracing::debug!(
            src = %path.display(),
            from = ?rgb.dimensions(),
            to = %target,
            "resizing reference frame"
        );
        image::imageops::resize(&rgb, width, height, FilterType::Lanczos3)
    } else {
        rgb
    };

    let mut encoded = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut encoded, ImageFormat::Png)
        .map_err(|source| PrepareError::Encode {
            path: path.to_path_buf(),
            width,
            height,
            source,
        })?;

    let io_err = |source: std::io::Error| PrepareError::Io {
        path: path.to_path_buf(),
        width,
        height,
        source,
    };
    let mut builder = tempfile::Builder::new();
    builder.prefix("reference-").suffix(".png");
    let mut tmp = match scratch_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(io_err)?;
    tmp.write_all(encoded.get_ref()).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;

    Ok(ReferenceAsset {
        file: tmp.into_temp_path(),
        source: path.to_path_buf(),
        resolution: target,
        resized,
    })
}

/// Prepare `path` for a clip of `size` (`"<w>x<h>"`), off the async runtime.
pub async fn prepare(
    path: &Path,
    size: &str,
    scratch_dir: Option<&Path>,
) -> Result<ReferenceAsset, PrepareError> {
    let owned_path = path.to_path_buf();
    let owned_size = size.to_string();
    let owned_scratch = scratch_dir.map(Path::to_path_buf);

    tokio::task::spawn_blocking(move || {
        prepare_blocking(&owned_path, &owned_size, owned_scratch.as_deref())
    })
    .await
    .map_err(|_| PrepareError::Aborted {
        path: path.to_path_buf(),
    })?
}
