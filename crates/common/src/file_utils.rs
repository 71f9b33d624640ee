use std::path::Path;
use uuid::Uuid;

/// Longest display name accepted for a file or folder
pub const MAX_FILENAME_LEN: usize = 255;

/// Error type for filename validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilenameValidationError {
    Empty,
    TooLong,
    ContainsNullByte,
    ContainsPathSeparator,
    IsSpecialDirectory,
}

impl FilenameValidationError {
    pub fn message(&self) -> &'static str {
        match self {
            FilenameValidationError::Empty => "Filename cannot be empty",
            FilenameValidationError::TooLong => "Filename must be at most 255 characters",
            FilenameValidationError::ContainsNullByte => "Filename cannot contain null bytes",
            FilenameValidationError::ContainsPathSeparator => {
                "Filename cannot contain path separators (/ or \\)"
            }
            FilenameValidationError::IsSpecialDirectory => "Filename cannot be '.' or '..'",
        }
    }
}

impl std::fmt::Display for FilenameValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for FilenameValidationError {}

/// Validate a user-supplied display name.
/// Names are metadata only (the provider namespace uses generated keys),
/// but they still end up in Content-Disposition headers and local paths.
pub fn validate_filename(filename: &str) -> Result<(), FilenameValidationError> {
    if filename.trim().is_empty() {
        return Err(FilenameValidationError::Empty);
    }

    if filename.chars().count() > MAX_FILENAME_LEN {
        return Err(FilenameValidationError::TooLong);
    }

    if filename.contains('\0') {
        return Err(FilenameValidationError::ContainsNullByte);
    }

    if filename.contains('/') || filename.contains('\\') {
        return Err(FilenameValidationError::ContainsPathSeparator);
    }

    if filename == "." || filename == ".." {
        return Err(FilenameValidationError::IsSpecialDirectory);
    }

    Ok(())
}

/// Lower-cased extension of a file name, without the dot
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Globally unique storage key for the flat provider namespace.
/// Keeps the original extension so the provider can still sniff the type.
pub fn unique_storage_key(filename: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    match extension_of(filename) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id,
    }
}

/// Quote a name for a Content-Disposition header
pub fn content_disposition(kind: &str, filename: &str) -> String {
    let escaped: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '"' { '\'' } else { c })
        .collect();
    format!("{}; filename=\"{}\"", kind, escaped)
}
