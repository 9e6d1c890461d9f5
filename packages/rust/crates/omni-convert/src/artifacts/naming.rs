//! Artifact naming and upload acceptance rules used by transports.

use std::path::Path;

use thiserror::Error;
use uuid::Uuid;

/// Output extension produced by the converter.
const OUTPUT_EXTENSION: &str = "step";

/// Why an upload was refused before reaching the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadRejected {
    /// Extension does not match the accepted one.
    #[error("Only {expected} files are allowed")]
    UnsupportedExtension {
        /// Accepted extension, upper-cased for display.
        expected: String,
    },
    /// Upload exceeds the configured maximum.
    #[error("File too large: {size_bytes} bytes (limit: {limit_bytes})")]
    TooLarge {
        /// Upload size.
        size_bytes: u64,
        /// Configured limit.
        limit_bytes: u64,
    },
    /// Zero-length upload.
    #[error("No file uploaded")]
    Empty,
}

/// Check extension (case-insensitive) and size of an upload.
pub fn validate_upload(
    original_filename: &str,
    size_bytes: u64,
    limit_bytes: u64,
    allowed_extension: &str,
) -> Result<(), UploadRejected> {
    if size_bytes == 0 {
        return Err(UploadRejected::Empty);
    }
    let extension = Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    if !extension.eq_ignore_ascii_case(allowed_extension) {
        return Err(UploadRejected::UnsupportedExtension {
            expected: allowed_extension.to_ascii_uppercase(),
        });
    }
    if size_bytes > limit_bytes {
        return Err(UploadRejected::TooLarge {
            size_bytes,
            limit_bytes,
        });
    }
    Ok(())
}

/// Unique stored name for an upload: `<uuid>` plus the original extension.
pub fn stored_upload_name(original_filename: &str) -> String {
    let id = Uuid::new_v4();
    match Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(ext) if !ext.is_empty() => format!("{id}.{ext}"),
        _ => id.to_string(),
    }
}

/// Output file name for a stored upload: same stem, `.step` extension.
pub fn output_filename_for(stored_upload_name: &str) -> String {
    let stem = Path::new(stored_upload_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(stored_upload_name);
    format!("{stem}.{OUTPUT_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_names_keep_extension_and_map_to_step() {
        let stored = stored_upload_name("Bracket.STL");
        assert!(stored.ends_with(".STL"));
        let output = output_filename_for(&stored);
        assert_eq!(output, format!("{}.step", stored.trim_end_matches(".STL")));
        assert_ne!(stored_upload_name("a.stl"), stored_upload_name("a.stl"));
    }

    #[test]
    fn validation_checks_extension_then_size() {
        assert_eq!(validate_upload("part.StL", 10, 100, "stl"), Ok(()));
        assert_eq!(
            validate_upload("part.obj", 10, 100, "stl"),
            Err(UploadRejected::UnsupportedExtension {
                expected: "STL".to_string()
            })
        );
        assert_eq!(
            validate_upload("part.stl", 101, 100, "stl"),
            Err(UploadRejected::TooLarge {
                size_bytes: 101,
                limit_bytes: 100
            })
        );
        assert_eq!(validate_upload("part.stl", 0, 100, "stl"), Err(UploadRejected::Empty));
    }
}
