//! Folder and object key construction

use crate::error::{Error, Result};

/// `name` with trailing `/` trimmed and exactly one appended.
pub fn folder_prefix(name: &str) -> Result<String> {
    let trimmed = name.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "folder name `{}` is empty",
            name
        )));
    }
    Ok(format!("{}/", trimmed))
}

/// Key of `file_name` inside `folder`; the bare file name when the folder is empty.
pub fn object_key(folder: &str, file_name: &str) -> String {
    let folder = folder.replace('\\', "/");
    let file_name = file_name.replace('\\', "/");
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        file_name
    } else {
        format!("{}/{}", folder, file_name)
    }
}

/// Move `key` from under `old_prefix` to under `new_prefix`.
///
/// Only the leading prefix is rewritten; a folder name that recurs deeper in
/// the key is left alone. `None` when `key` is not under `old_prefix`.
pub fn renamed_key(key: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    key.strip_prefix(old_prefix)
        .map(|rest| format!("{}{}", new_prefix, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_prefix_normalizes_trailing_separator() {
        assert_eq!(folder_prefix("photos").unwrap(), "photos/");
        assert_eq!(folder_prefix("photos/").unwrap(), "photos/");
        assert_eq!(folder_prefix("photos///").unwrap(), "photos/");
        assert_eq!(folder_prefix("a/b").unwrap(), "a/b/");
    }

    #[test]
    fn test_folder_prefix_rejects_empty() {
        assert!(matches!(folder_prefix(""), Err(Error::InvalidArgument(_))));
        assert!(matches!(folder_prefix("//"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("photos", "cat.png"), "photos/cat.png");
        assert_eq!(object_key("photos/", "cat.png"), "photos/cat.png");
        assert_eq!(object_key("", "cat.png"), "cat.png");
        assert_eq!(object_key("a\\b", "c.txt"), "a/b/c.txt");
    }

    #[test]
    fn test_renamed_key_rewrites_only_leading_prefix() {
        assert_eq!(
            renamed_key("a/x/a/file.txt", "a/", "b/").as_deref(),
            Some("b/x/a/file.txt")
        );
        assert_eq!(renamed_key("a/", "a/", "b/").as_deref(), Some("b/"));
        assert_eq!(renamed_key("xa/file", "a/", "b/"), None);
    }
}
