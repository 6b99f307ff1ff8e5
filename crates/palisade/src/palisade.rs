//! Main entry point for a Palisade instance.
//!
//! A [`Palisade`] owns one instance's access model and the synchronizer that
//! keeps it in step with the coordination store. Request-handling threads
//! share it by reference or through an `Arc`.

use std::path::Path;
use std::sync::Arc;

use palisade_config::{ConfigLoader, PalisadeConfig};
use palisade_rbac::{AccessModel, ActionOutcome, PrincipalRef, PrivilegeAction, PrivilegePath};
use palisade_sync::{CoordinationStore, Synchronizer};
use tracing::info;

use crate::error::Result;

/// One proxy instance's access control.
#[derive(Debug)]
pub struct Palisade {
    sync: Synchronizer,
}

impl Palisade {
    /// Seeds an access model from `config` and connects it to `store`.
    ///
    /// The seed only lands in the store for partitions nobody created yet;
    /// otherwise the store's state wins.
    pub fn open(config: &PalisadeConfig, store: Arc<dyn CoordinationStore>) -> Result<Self> {
        config.validate().map_err(anyhow::Error::from)?;

        let model = Arc::new(AccessModel::from_config(config)?);
        let sync = Synchronizer::start(model, store, config.sync.clone())?;

        info!(
            users = config.users.len(),
            roles = config.roles.len(),
            "palisade instance opened"
        );
        Ok(Self { sync })
    }

    /// Loads configuration from `project_dir` (plus user config and
    /// environment) and opens an instance on `store`.
    pub fn open_from_dir(
        project_dir: impl AsRef<Path>,
        store: Arc<dyn CoordinationStore>,
    ) -> Result<Self> {
        let config = ConfigLoader::new().with_project_dir(project_dir).load()?;
        Self::open(&config, store)
    }

    /// Opens an instance with a config built by `loader`.
    pub fn open_with_loader(loader: ConfigLoader, store: Arc<dyn CoordinationStore>) -> Result<Self> {
        Self::open(&loader.load()?, store)
    }

    pub fn model(&self) -> &AccessModel {
        self.sync.model()
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    /// Runs a DCL action. Mutations are committed to the store before this
    /// returns.
    pub fn execute(&self, action: &PrivilegeAction) -> Result<ActionOutcome> {
        Ok(self.sync.execute(action)?)
    }

    /// Returns whether `user` may perform `action_type` on `path`
    /// (`db`, `db.table` or `db.table.col1;col2`).
    pub fn check(&self, user: &str, action_type: &str, path: &str) -> Result<bool> {
        let path: PrivilegePath = path.parse()?;
        Ok(self.model().check(user, action_type, &path)?)
    }

    pub fn grant(&self, principal: PrincipalRef, action_type: &str, path: &str) -> Result<()> {
        self.execute(&PrivilegeAction::grant(principal, action_type, path.parse()?))
            .map(drop)
    }

    pub fn revoke(&self, principal: PrincipalRef, action_type: &str, path: &str) -> Result<()> {
        self.execute(&PrivilegeAction::revoke(principal, action_type, path.parse()?))
            .map(drop)
    }

    pub fn grant_role(&self, user: &str, role: &str) -> Result<()> {
        self.execute(&PrivilegeAction::grant_role(user, role)).map(drop)
    }

    pub fn revoke_role(&self, user: &str, role: &str) -> Result<()> {
        self.execute(&PrivilegeAction::revoke_role(user, role)).map(drop)
    }

    pub fn create_user(&self, user: &str, password: &str) -> Result<()> {
        self.execute(&PrivilegeAction::create_user(user, password))
            .map(drop)
    }

    pub fn create_role(&self, role: &str) -> Result<()> {
        self.execute(&PrivilegeAction::create_role(role)).map(drop)
    }

    pub fn remove_user(&self, user: &str) -> Result<()> {
        self.execute(&PrivilegeAction::remove_user(user)).map(drop)
    }

    pub fn remove_role(&self, role: &str) -> Result<()> {
        self.execute(&PrivilegeAction::remove_role(role)).map(drop)
    }

    pub fn disable_user(&self, user: &str) -> Result<()> {
        self.execute(&PrivilegeAction::disable_user(user)).map(drop)
    }

    /// Closes the store connection and stops watching. Idempotent; also run
    /// on drop.
    pub fn close(&self) {
        self.sync.close();
    }
}
