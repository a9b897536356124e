use std::path::Path;
use tracing::{debug, info};

use super::SessionConfig;
use crate::error::{AppError, Result};

/// Load configuration from a JSON file
///
/// Missing keys fall back to their defaults; the result is validated before
/// it is returned.
pub async fn load_config(path: &Path) -> Result<SessionConfig> {
    let raw = tokio::fs::read_to_string(path).await?;
    let config: SessionConfig = serde_json::from_str(&raw)
        .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
    config.validate()?;

    info!("Loaded session config from {}", path.display());
    Ok(config)
}

/// Load configuration from `path` if given, defaults otherwise
pub async fn load_or_default(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => load_config(path).await,
        None => {
            debug!("No config file given, using defaults");
            Ok(SessionConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "monitor": {{ "interval_ms": 1000 }}, "stream": {{ "audio": {{ "quality": "high" }} }} }}"#
        )
        .unwrap();

        let config = load_config(file.path()).await.unwrap();
        assert_eq!(config.monitor.interval_ms, 1000);
        assert_eq!(config.stream.audio.bitrate(), 192_000);
        assert_eq!(config.retry.backoff_ms, 100);
    }

    #[tokio::test]
    async fn test_load_config_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "target": {{ "default_port": 0 }} }}"#).unwrap();

        let err = load_config(file.path()).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_load_config_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        assert!(matches!(
            load_config(file.path()).await,
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }

    #[tokio::test]
    async fn test_load_or_default_without_path() {
        let config = load_or_default(None).await.unwrap();
        assert_eq!(config, SessionConfig::default());
    }
}
