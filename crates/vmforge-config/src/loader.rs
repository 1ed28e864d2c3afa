use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{Paths, VmforgeConfig};

/// Builder for a layered configuration load, lowest to highest
/// precedence: defaults, user config, project config, local overrides,
/// environment variables.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")), env_prefix: "VMFORGE".to_string() }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(self) -> Result<VmforgeConfig> {
        let mut builder = config::Config::builder();

        let defaults = VmforgeConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder =
                    builder.add_source(config::File::from(user_config_file).required(false).format(config::FileFormat::Toml));
            }
        }

        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder =
                builder.add_source(config::File::from(project_config_file).required(false).format(config::FileFormat::Toml));
        }

        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder =
                builder.add_source(config::File::from(local_config_file).required(false).format(config::FileFormat::Toml));
        }

        builder = builder
            .add_source(config::Environment::with_prefix(&self.env_prefix).separator("_").try_parsing(true));

        let built = builder.build().context("failed to build configuration")?;
        built.try_deserialize().context("failed to deserialize configuration")
    }

    pub fn load_or_default(self) -> VmforgeConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_load_with_no_config_files_present() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new().with_project_dir(dir.path()).load().unwrap();
        assert_eq!(config.database.url, "postgres://localhost/vmforge");
        assert_eq!(config.snapshot.threshold, 100);
    }

    #[test]
    fn project_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("vmforge.toml"),
            r#"
[database]
url = "postgres://db.internal/vmforge"
max_connections = 50

[provisioning]
stall_threshold_secs = 600
"#,
        )
        .unwrap();

        let config = ConfigLoader::new().with_project_dir(dir.path()).load().unwrap();
        assert_eq!(config.database.url, "postgres://db.internal/vmforge");
        assert_eq!(config.database.max_connections, 50);
        assert_eq!(config.provisioning.stall_threshold_secs, 600);
    }

    #[test]
    fn local_overrides_win_over_project_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("vmforge.toml"), "[database]\nurl = \"postgres://project/vmforge\"\n").unwrap();
        fs::write(dir.path().join("vmforge.local.toml"), "[database]\nurl = \"postgres://localhost/dev\"\n").unwrap();

        let config = ConfigLoader::new().with_project_dir(dir.path()).load().unwrap();
        assert_eq!(config.database.url, "postgres://localhost/dev");
    }
}
