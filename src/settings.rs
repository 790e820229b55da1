use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const FILE_STEM: &str = "leadscrape";
const ENV_PREFIX: &str = "LEADSCRAPE";

/// Layered: defaults, then `leadscrape.{toml,json,…}` if present, then
/// `LEADSCRAPE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Where `--upload` posts the export. Upload is skipped when unset.
    pub webhook_url: Option<String>,
    pub upload_timeout_secs: u64,
    /// Directory searched for `<name>.json` before the built-in profiles.
    pub profile_dir: Option<PathBuf>,
}

impl Settings {
    pub fn load() -> Result<Settings, ConfigError> {
        Settings::load_from(Path::new(FILE_STEM))
    }

    pub fn load_from(file_stem: &Path) -> Result<Settings, ConfigError> {
        Config::builder()
            .set_default("upload_timeout_secs", 60)?
            .add_source(File::with_name(&file_stem.to_string_lossy()).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load_from(&dir.path().join("leadscrape")).unwrap();
        assert_eq!(s.upload_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("leadscrape.toml"),
            "webhook_url = \"https://hooks.example/abc\"\nupload_timeout_secs = 5\nprofile_dir = \"rules\"\n",
        )
        .unwrap();
        let s = Settings::load_from(&dir.path().join("leadscrape")).unwrap();
        assert_eq!(s.webhook_url.as_deref(), Some("https://hooks.example/abc"));
        assert_eq!(s.upload_timeout_secs, 5);
        assert_eq!(s.profile_dir, Some(PathBuf::from("rules")));
    }
}
