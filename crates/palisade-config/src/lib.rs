//! Settings for a Palisade proxy instance.
//!
//! A [`PalisadeConfig`] has two halves: [`SyncSettings`] for talking to the
//! coordination store, and the roles and users an instance seeds its access
//! model with before it first synchronizes. See [`ConfigLoader`] for where
//! the values come from and in which order they override each other.
//!
//! Privilege paths are kept as plain strings here (`db`, `db.table`,
//! `db.table.col1;col2`); the access model parses and rejects them.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{ConfigLocations, Layer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PalisadeConfig {
    pub sync: SyncSettings,
    pub roles: BTreeMap<String, RoleDefinition>,
    pub users: BTreeMap<String, UserDefinition>,
}

/// Settings for the coordination-store synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Upper bound on conflict-driven replays of a single commit.
    pub max_retries: u32,
    /// Store path under which the four partitions live.
    pub root_path: String,
    /// Encoding used for partition payloads.
    pub codec: CodecKind,
    /// Buffered watch events per subscription before a receiver lags.
    pub watch_buffer: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_retries: 15,
            root_path: "/palisade/access".to_string(),
            codec: CodecKind::Postcard,
            watch_buffer: 256,
        }
    }
}

impl SyncSettings {
    /// Returns the store path for a partition segment such as `user-info`.
    pub fn partition_path(&self, segment: &str) -> String {
        format!("{}/{segment}", self.root_path)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CodecKind {
    Postcard,
    Json,
}

/// Privileges a principal starts with, one list per action type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantSet {
    pub insert: Vec<String>,
    pub delete: Vec<String>,
    pub select: Vec<String>,
    pub update: Vec<String>,
}

impl GrantSet {
    /// Iterates `(action_type, path)` pairs in a fixed action-type order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        let lists: [(&'static str, &Vec<String>); 4] = [
            ("insert", &self.insert),
            ("delete", &self.delete),
            ("select", &self.select),
            ("update", &self.update),
        ];
        lists
            .into_iter()
            .flat_map(|(kind, paths)| paths.iter().map(move |p| (kind, p.as_str())))
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }
}

/// A role's seed privileges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleDefinition {
    pub insert: Vec<String>,
    pub delete: Vec<String>,
    pub select: Vec<String>,
    pub update: Vec<String>,
}

impl RoleDefinition {
    pub fn grants(&self) -> GrantSet {
        GrantSet {
            insert: self.insert.clone(),
            delete: self.delete.clone(),
            select: self.select.clone(),
            update: self.update.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserDefinition {
    pub password: String,
    pub roles: Vec<String>,
    pub insert: Vec<String>,
    pub delete: Vec<String>,
    pub select: Vec<String>,
    pub update: Vec<String>,
}

impl UserDefinition {
    pub fn grants(&self) -> GrantSet {
        GrantSet {
            insert: self.insert.clone(),
            delete: self.delete.clone(),
            select: self.select.clone(),
            update: self.update.clone(),
        }
    }
}

impl PalisadeConfig {
    /// Loads from the current directory and the usual layers.
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Checks invariants the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sync = &self.sync;
        if sync.max_retries == 0 {
            return Err(ConfigError::Invalid {
                setting: "sync.max_retries",
                reason: "must be at least 1".to_string(),
            });
        }

        let root = sync.root_path.as_str();
        if !root.starts_with('/') || (root.len() > 1 && root.ends_with('/')) {
            return Err(ConfigError::Invalid {
                setting: "sync.root_path",
                reason: format!("'{root}' is not absolute or ends with '/'"),
            });
        }

        if sync.watch_buffer == 0 {
            return Err(ConfigError::Invalid {
                setting: "sync.watch_buffer",
                reason: "must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PalisadeConfig::default();
        assert_eq!(config.sync.max_retries, 15);
        assert_eq!(config.sync.root_path, "/palisade/access");
        assert_eq!(config.sync.codec, CodecKind::Postcard);
        assert!(config.roles.is_empty());
        assert!(config.users.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partition_path() {
        let sync = SyncSettings::default();
        assert_eq!(
            sync.partition_path("user-info"),
            "/palisade/access/user-info"
        );
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let mut config = PalisadeConfig::default();
        config.sync.max_retries = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                setting: "sync.max_retries",
                ..
            })
        ));

        let mut config = PalisadeConfig::default();
        config.sync.root_path = "relative/path".to_string();
        assert!(config.validate().is_err());

        let mut config = PalisadeConfig::default();
        config.sync.root_path = "/trailing/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_grant_set_entries_order() {
        let grants = GrantSet {
            insert: vec!["db1.t1".to_string()],
            delete: vec![],
            select: vec!["db1.*".to_string(), "db2".to_string()],
            update: vec![],
        };

        let entries: Vec<_> = grants.entries().collect();
        assert_eq!(
            entries,
            vec![
                ("insert", "db1.t1"),
                ("select", "db1.*"),
                ("select", "db2")
            ]
        );
        assert!(!grants.is_empty());
        assert!(GrantSet::default().is_empty());
    }

    #[test]
    fn test_parse_definitions_from_toml() {
        let config: PalisadeConfig = toml::from_str(
            r#"
[sync]
max_retries = 3

[roles.analyst]
select = ["sales.*"]

[users.alice]
password = "secret"
roles = ["analyst"]
insert = ["sales.orders.id;amount"]
"#,
        )
        .expect("valid toml");

        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.root_path, "/palisade/access");
        assert_eq!(config.roles["analyst"].select, vec!["sales.*"]);

        let alice = &config.users["alice"];
        assert_eq!(alice.password, "secret");
        assert_eq!(alice.roles, vec!["analyst"]);
        assert_eq!(alice.insert, vec!["sales.orders.id;amount"]);
    }
}
