use std::{fs, path::Path};

use super::SettingsPatch;
use crate::error::ConfigError;

/// Reads and validates a JSON config file.
///
/// Symbolic links are refused before the file is opened, so a config path
/// cannot be swapped for a link to another file.
///
/// # Arguments
///
/// * `path`: The config file to read.
///
/// # Returns
///
/// The validated patch, ready to be applied in one step.
pub fn load_patch(path: &Path) -> Result<SettingsPatch, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let metadata = fs::symlink_metadata(path).map_err(io_error)?;
    if metadata.file_type().is_symlink() {
        return Err(ConfigError::Symlink(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(io_error)?;
    let patch: SettingsPatch =
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    patch.validate()?;

    #[cfg(feature = "log")]
    log::debug!("Loaded config file {}", path.display());
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "browser.conf.json", r#"{"cache_ttl": 42}"#);

        let patch = load_patch(&path).unwrap();
        assert_eq!(patch.cache_ttl, Some(42));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let target = write_config(dir.path(), "real.json", "{}");
        let link = dir.path().join("link.json");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(matches!(load_patch(&link), Err(ConfigError::Symlink(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("dangling.json");
        std::os::unix::fs::symlink(dir.path().join("missing.json"), &link).unwrap();

        assert!(matches!(load_patch(&link), Err(ConfigError::Symlink(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_patch(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "broken.json", r#"{"cache_ttl": "#);
        assert!(matches!(load_patch(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_invalid_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "bad.json", r#"{"basic_auth": "nocolon"}"#);
        assert!(matches!(
            load_patch(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
