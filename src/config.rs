use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ERROR_TAGS: [&str; 3] = ["Spelling", "Motor", "Incomplete"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Error targets are offered again after a full forward pass
    pub cyclic_remaining_targets: bool,
    pub error_tags: Vec<String>,
    pub screen_width: i32,
    pub screen_height: i32,
    /// Folder with the targets' sound files; sound-driven trials need it
    pub sounds_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cyclic_remaining_targets: true,
            error_tags: default_error_tags(),
            screen_width: 1920,
            screen_height: 1080,
            sounds_dir: None,
        }
    }
}

pub fn default_error_tags() -> Vec<String> {
    DEFAULT_ERROR_TAGS.iter().map(|t| t.to_string()).collect()
}

/// Comma separated tags; blanks dropped, defaults when nothing is left
pub fn parse_error_tags(input: &str) -> Vec<String> {
    let tags: Vec<String> = input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if tags.is_empty() {
        default_error_tags()
    } else {
        tags
    }
}

/// `1920x1080` style screen geometry
pub fn parse_screen(input: &str) -> Result<(i32, i32), String> {
    let (w, h) = input
        .split_once(|c: char| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{input}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<i32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid screen dimension '{v}'"))
    };
    Ok((parse(w)?, parse(h)?))
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "writracker") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("writracker_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => tracing::warn!(
                    file = %self.path.display(),
                    error = %e,
                    "ignoring unreadable config"
                ),
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            cyclic_remaining_targets: false,
            error_tags: vec!["Mirror".into(), "Tremor".into()],
            screen_width: 2560,
            screen_height: 1440,
            sounds_dir: Some(PathBuf::from("/data/sounds")),
        };
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn corrupt_or_partial_config_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(store.load(), Config::default());

        fs::write(&path, r#"{ "cyclic_remaining_targets": false }"#).unwrap();
        let loaded = store.load();
        assert!(!loaded.cyclic_remaining_targets);
        assert_eq!(loaded.error_tags, default_error_tags());
    }

    #[test]
    fn error_tags_parsing() {
        assert_eq!(parse_error_tags(" Motor , ,Spelling"), ["Motor", "Spelling"]);
        assert_eq!(parse_error_tags(""), default_error_tags());
        assert_eq!(parse_error_tags(" , "), default_error_tags());
    }

    #[test]
    fn screen_parsing() {
        assert_eq!(parse_screen("1920x1080"), Ok((1920, 1080)));
        assert_eq!(parse_screen("800X600"), Ok((800, 600)));
        assert!(parse_screen("1920").is_err());
        assert!(parse_screen("0x10").is_err());
    }
}
