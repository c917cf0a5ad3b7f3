use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Connection settings for the coordination service.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordConfig {
    pub endpoints: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub fn load_coord_config(path: &str) -> Result<CoordConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config from {path}"))?;
    let cfg: CoordConfig = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "endpoints:\n  - \"http://127.0.0.1:2379\"\nusername: admin\npassword: secret\n"
        )
        .unwrap();

        let cfg = load_coord_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.endpoints, vec!["http://127.0.0.1:2379".to_string()]);
        assert_eq!(cfg.username.as_deref(), Some("admin"));
        assert_eq!(cfg.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_load_config_without_auth() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "endpoints:\n  - \"http://10.0.0.1:2379\"\n").unwrap();

        let cfg = load_coord_config(file.path().to_str().unwrap()).unwrap();
        assert!(cfg.username.is_none());
        assert!(cfg.password.is_none());
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_coord_config("/nonexistent/config.yaml").is_err());
    }
}
