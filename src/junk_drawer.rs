use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};

pub fn system_time_to_string(system_time: SystemTime) -> String {
    let datetime: DateTime<Local> = system_time.into();
    // Format the datetime as a string, e.g. "2021-01-01 12:00:00".
    // The default to_string() includes fractional seconds and the
    // timezone, which we don't want in report headers.
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Extracts the final component of a path as an owned String.
/// Composites are stored keyed by the uploaded file's name, so a path
/// that has no filename (or is not valid UTF-8) is an error here.
pub fn filename_from_path(path: &Path) -> anyhow::Result<String> {
    let filename = path
        .file_name()
        .ok_or(anyhow::anyhow!(
            "Unable to get filename from {:?}. Does it end with ..?",
            path
        ))?
        .to_str()
        .ok_or(anyhow::anyhow!(
            "Error converting filename to String. Path is likely not valid UTF-8."
        ))?;
    Ok(filename.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_of_plain_file() {
        let name = filename_from_path(Path::new("/uploads/scan_042.jpg")).unwrap();
        assert_eq!(name, "scan_042.jpg");
    }

    #[test]
    fn filename_of_parent_traversal_fails() {
        assert!(filename_from_path(Path::new("/uploads/..")).is_err());
    }
}
