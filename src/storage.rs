//! Persistence of saliency composites.
//!
//! The pipeline returns composites as values; whether and where they land
//! on disk is decided here, by the caller. Composites are keyed by the
//! uploaded file's name so the explanation step (which sends the overlay to
//! the language model) can find them again.

use std::path::{Path, PathBuf};

use anyhow::Context;
use image::RgbImage;
use log::info;

/// Default storage root, under the platform's local app-data directory.
pub fn default_storage_dir() -> anyhow::Result<PathBuf> {
    let base = dirs::data_local_dir().ok_or(anyhow::anyhow!("Error getting local data path"))?;
    Ok(base.join("neuroscan").join("saliency_maps"))
}

/// Writes `composite` to `{storage_dir}/{original_filename}`, creating the
/// directory if needed, and returns the full path. The image format follows
/// the filename's extension, which upload validation has already
/// constrained to jpg/jpeg/png.
pub fn persist_composite(
    composite: &RgbImage,
    storage_dir: &Path,
    original_filename: &str,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(storage_dir)
        .with_context(|| format!("Error creating storage directory {:?}", storage_dir))?;

    let path = storage_dir.join(original_filename);
    composite
        .save(&path)
        .with_context(|| format!("Error saving saliency composite to {:?}", path))?;

    info!("Saved saliency composite to {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use uuid::Uuid;

    #[test]
    fn composite_lands_keyed_by_upload_name() {
        let dir = std::env::temp_dir().join(format!("neuroscan-test-{}", Uuid::new_v4()));
        let composite = RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]));

        let path = persist_composite(&composite, &dir, "scan_042.png").unwrap();

        assert_eq!(path, dir.join("scan_042.png"));
        let read_back = image::open(&path).unwrap().to_rgb8();
        assert_eq!(read_back.dimensions(), (8, 8));
        assert_eq!(*read_back.get_pixel(3, 3), Rgb([10, 20, 30]));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unwritable_extension_is_an_error() {
        let dir = std::env::temp_dir().join(format!("neuroscan-test-{}", Uuid::new_v4()));
        let composite = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));

        assert!(persist_composite(&composite, &dir, "scan_042.unknown").is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
