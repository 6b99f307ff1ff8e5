//! Layered configuration loading.
//!
//! Layers are merged with the `config` crate, later ones overriding
//! earlier ones key by key:
//!
//! ```text
//!   built-in defaults
//!   user file       ~/.config/palisade/config.toml
//!   project file    palisade.toml
//!   local file      palisade.local.toml
//!   extra files     in the order they were added
//!   environment     PALISADE_SYNC__MAX_RETRIES=3
//! ```

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};

use crate::PalisadeConfig;
use crate::paths::{ConfigLocations, Layer, read_layer};

pub struct ConfigLoader {
    locations: ConfigLocations,
    env_prefix: String,
    user_layer: bool,
    extra: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Loader rooted at the current directory, reading `PALISADE_*` variables.
    pub fn new() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            locations: ConfigLocations::new(cwd),
            env_prefix: "PALISADE".to_string(),
            user_layer: true,
            extra: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.locations = ConfigLocations::new(dir.as_ref());
        self
    }

    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Ignores the per-user file so results do not depend on the machine.
    #[must_use]
    pub fn without_user_config(mut self) -> Self {
        self.user_layer = false;
        self
    }

    /// Adds a file merged after the local file. Unlike the standard layers
    /// it must exist.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra.push(path.into());
        self
    }

    /// Files that will be merged, lowest precedence first. Standard layers
    /// that do not exist are left out; extra files are always listed.
    pub fn layers(&self) -> Vec<(Layer, PathBuf)> {
        let mut standard = vec![Layer::Project, Layer::Local];
        if self.user_layer {
            standard.insert(0, Layer::User);
        }

        standard
            .into_iter()
            .filter_map(|layer| self.locations.file(layer).map(|path| (layer, path)))
            .filter(|(_, path)| path.is_file())
            .chain(self.extra.iter().map(|path| (Layer::Extra, path.clone())))
            .collect()
    }

    /// Merges every layer, then validates the result.
    pub fn load(self) -> Result<PalisadeConfig> {
        let defaults = Config::try_from(&PalisadeConfig::default())
            .context("serializing built-in defaults")?;

        // Parse each file on its own first so a bad file is reported by
        // path with a typed error instead of as a merge failure.
        let layers = self.layers();
        for (layer, path) in &layers {
            read_layer(path).with_context(|| format!("reading {layer} configuration"))?;
        }

        let builder = layers.into_iter().fold(
            Config::builder().add_source(defaults),
            |builder: ConfigBuilder<DefaultState>, (layer, path)| {
                tracing::debug!(%layer, path = %path.display(), "adding config layer");
                builder.add_source(
                    File::from(path)
                        .format(FileFormat::Toml)
                        .required(layer == Layer::Extra),
                )
            },
        );

        let merged = builder
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("merging configuration layers")?;

        let config: PalisadeConfig = merged
            .try_deserialize()
            .context("configuration does not match the expected shape")?;
        config.validate().context("rejecting configuration")?;
        Ok(config)
    }

    /// Like [`load`](Self::load), falling back to defaults on any failure.
    pub fn load_or_default(self) -> PalisadeConfig {
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
    use crate::{CodecKind, ConfigError};
    use std::fs;
    use tempfile::tempdir;

    fn hermetic(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("PALISADE_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn empty_project_yields_defaults() {
        let dir = tempdir().unwrap();
        let loader = hermetic(dir.path());
        assert!(loader.layers().is_empty());

        let config = loader.load().unwrap();
        assert_eq!(config.sync.max_retries, 15);
        assert_eq!(config.sync.codec, CodecKind::Postcard);
        assert!(config.users.is_empty());
    }

    #[test]
    fn project_file_supplies_settings_and_principals() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("palisade.toml"),
            r#"
[sync]
max_retries = 4
root_path = "/proxy/acl"
codec = "json"

[roles.reporting]
select = ["warehouse.*"]

[users.carol]
password = "pw"
roles = ["reporting"]
update = ["warehouse.orders.status"]
"#,
        )
        .unwrap();

        let config = hermetic(dir.path()).load().unwrap();
        assert_eq!(config.sync.max_retries, 4);
        assert_eq!(config.sync.root_path, "/proxy/acl");
        assert_eq!(config.sync.codec, CodecKind::Json);
        assert_eq!(config.roles["reporting"].select, vec!["warehouse.*"]);
        assert_eq!(config.users["carol"].roles, vec!["reporting"]);
        assert_eq!(config.users["carol"].update, vec!["warehouse.orders.status"]);
    }

    #[test]
    fn later_layers_win() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("palisade.toml"), "[sync]\nmax_retries = 4\n").unwrap();
        fs::write(
            dir.path().join("palisade.local.toml"),
            "[sync]\nmax_retries = 9\nwatch_buffer = 8\n",
        )
        .unwrap();
        let extra = dir.path().join("ops.toml");
        fs::write(&extra, "[sync]\nwatch_buffer = 32\n").unwrap();

        let loader = hermetic(dir.path()).with_file(&extra);
        let layers: Vec<Layer> = loader.layers().into_iter().map(|(l, _)| l).collect();
        assert_eq!(layers, vec![Layer::Project, Layer::Local, Layer::Extra]);

        let config = loader.load().unwrap();
        assert_eq!(config.sync.max_retries, 9);
        assert_eq!(config.sync.watch_buffer, 32);
    }

    #[test]
    fn missing_extra_file_is_an_error() {
        let dir = tempdir().unwrap();
        let loader = hermetic(dir.path()).with_file(dir.path().join("absent.toml"));
        assert!(loader.load().is_err());
    }

    #[test]
    fn broken_layer_is_reported_by_path() {
        let dir = tempdir().unwrap();
        let broken = dir.path().join("palisade.local.toml");
        fs::write(&broken, "[sync\nmax_retries = ").unwrap();

        let err = hermetic(dir.path()).load().unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::Parse { path, .. }) => assert_eq!(path, &broken),
            other => panic!("expected a parse error, got {other:?}"),
        }

        let missing = dir.path().join("absent.toml");
        fs::remove_file(&broken).unwrap();
        let err = hermetic(dir.path()).with_file(&missing).load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("palisade.toml"), "[sync]\nmax_retries = 0\n").unwrap();

        assert!(hermetic(dir.path()).load().is_err());
        assert_eq!(hermetic(dir.path()).load_or_default().sync.max_retries, 15);
    }
}
