//! Helpers for turning client-supplied names into safe filesystem names.

use uuid::Uuid;

const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3",
];

/// Reduce an uploaded filename to a safe, flat ASCII name.
///
/// Path separators become spaces, whitespace runs become `_`, anything outside
/// `[A-Za-z0-9._-]` is dropped, and leading/trailing `.`/`_` are stripped. Windows device names
/// get a `_` prefix. Returns an empty string when nothing survives.
pub fn secure_filename(filename: &str) -> String {
    let flattened: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    let stem = trimmed.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|name| name.eq_ignore_ascii_case(stem))
    {
        return format!("_{trimmed}");
    }
    trimmed.to_string()
}

/// [`secure_filename`] with a fallback of `document.{extension}` when nothing survives.
pub fn secure_filename_or(filename: &str, extension: &str) -> String {
    let sanitized = secure_filename(filename);
    if sanitized.is_empty() || !sanitized.contains('.') {
        return format!("document.{extension}");
    }
    sanitized
}

/// Filename without its final extension.
pub fn base_name(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base,
        _ => filename,
    }
}

/// Unique directory name for a document's index: `index_{base}_{8 hex}`.
pub fn index_dir_name(base: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("index_{base}_{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_paths_and_unsafe_characters() {
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("My Lecture Notes (v2).pdf"), "My_Lecture_Notes_v2.pdf");
        assert_eq!(secure_filename("C:\\Users\\me\\notes.txt"), "C_Users_me_notes.txt");
    }

    #[test]
    fn prefixes_windows_device_names() {
        assert_eq!(secure_filename("con.txt"), "_con.txt");
    }

    #[test]
    fn falls_back_when_nothing_survives() {
        assert_eq!(secure_filename("日本語.pdf"), "pdf");
        assert_eq!(secure_filename_or("日本語.pdf", "pdf"), "document.pdf");
        assert_eq!(secure_filename_or("...", "txt"), "document.txt");
        assert_eq!(secure_filename_or("notes.txt", "txt"), "notes.txt");
    }

    #[test]
    fn base_name_drops_last_extension() {
        assert_eq!(base_name("chapter.one.docx"), "chapter.one");
        assert_eq!(base_name("README"), "README");
    }

    #[test]
    fn index_dir_names_are_unique() {
        let first = index_dir_name("notes");
        let second = index_dir_name("notes");
        assert!(first.starts_with("index_notes_"));
        assert_eq!(first.len(), "index_notes_".len() + 8);
        assert_ne!(first, second);
    }
}
