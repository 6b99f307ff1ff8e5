//! Where configuration files live.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::{ConfigError, PalisadeConfig};

const PROJECT_FILE: &str = "palisade.toml";
const LOCAL_FILE: &str = "palisade.local.toml";
const USER_FILE: &str = "config.toml";

/// One file-backed configuration layer, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    /// `~/.config/palisade/config.toml`
    User,
    /// `palisade.toml` in the project directory.
    Project,
    /// `palisade.local.toml`, kept out of version control.
    Local,
    /// A file added with [`ConfigLoader::with_file`](crate::ConfigLoader::with_file).
    Extra,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::User => "user",
            Layer::Project => "project",
            Layer::Local => "local",
            Layer::Extra => "extra",
        })
    }
}

/// Resolves configuration file locations for a project directory.
#[derive(Debug, Clone)]
pub struct ConfigLocations {
    project_dir: PathBuf,
    user_dir: Option<PathBuf>,
}

impl ConfigLocations {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let user_dir = ProjectDirs::from("io", "Palisade", "palisade")
            .map(|dirs| dirs.config_dir().to_path_buf());
        Self {
            project_dir: project_dir.into(),
            user_dir,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Per-user config file, from the platform's XDG-style config directory.
    pub fn user_file(&self) -> Result<PathBuf, ConfigError> {
        self.user_dir
            .as_ref()
            .map(|dir| dir.join(USER_FILE))
            .ok_or(ConfigError::NoHomeDirectory)
    }

    pub fn project_file(&self) -> PathBuf {
        self.project_dir.join(PROJECT_FILE)
    }

    pub fn local_file(&self) -> PathBuf {
        self.project_dir.join(LOCAL_FILE)
    }

    /// Location of a standard layer. `None` for [`Layer::Extra`], and for
    /// [`Layer::User`] when there is no home directory.
    pub fn file(&self, layer: Layer) -> Option<PathBuf> {
        match layer {
            Layer::User => self.user_file().ok(),
            Layer::Project => Some(self.project_file()),
            Layer::Local => Some(self.local_file()),
            Layer::Extra => None,
        }
    }
}

/// Parses one file on its own, without defaults from other layers filled
/// in beyond the per-field serde defaults.
pub(crate) fn read_layer(path: impl AsRef<Path>) -> Result<PalisadeConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
