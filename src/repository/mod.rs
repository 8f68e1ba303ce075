//! Application repository (§6, consumed interface; §9 design note on the
//! lock pattern). The production deployment of this crate would point at a
//! network-backed store; this module ships the reference, in-memory
//! implementation used by the Home-mode binary and by every test in this
//! crate.
//!
//! Unlike `BuildService`, which is genuinely swappable (HTTP vs. fake), this
//! crate ships exactly one repository implementation, so it is a concrete
//! struct rather than a trait — mirroring the teacher's bare `Database`
//! struct rather than inventing an abstraction with a single implementor.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::domain::{Application, ApplicationId};
use crate::error::{Result, TriggerError};

/// Per-id locked map of applications. New ids are inserted under the outer
/// `RwLock`; mutation of an existing application never touches it — only the
/// per-application `Mutex` is taken, so unrelated applications never
/// contend.
pub struct ApplicationRepository {
    apps: RwLock<HashMap<ApplicationId, Arc<Mutex<Application>>>>,
}

impl Default for ApplicationRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationRepository {
    pub fn new() -> Self {
        Self {
            apps: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a brand-new application. Overwrites any existing entry for
    /// the same id — used by tests and by config-driven bootstrap, never by
    /// the trigger's own state transitions.
    pub async fn insert(&self, application: Application) {
        let mut apps = self.apps.write().await;
        apps.insert(application.id.clone(), Arc::new(Mutex::new(application)));
    }

    pub async fn get(&self, id: &ApplicationId) -> Option<Application> {
        let apps = self.apps.read().await;
        match apps.get(id) {
            Some(slot) => Some(slot.lock().await.clone()),
            None => None,
        }
    }

    pub async fn require(&self, id: &ApplicationId) -> Result<Application> {
        self.get(id).await.ok_or_else(|| TriggerError::UnknownApplication {
            application: id.clone(),
        })
    }

    pub async fn as_list(&self) -> Vec<Application> {
        let apps = self.apps.read().await;
        let mut out = Vec::with_capacity(apps.len());
        for slot in apps.values() {
            out.push(slot.lock().await.clone());
        }
        out
    }

    fn slot(&self, apps: &HashMap<ApplicationId, Arc<Mutex<Application>>>, id: &ApplicationId) -> Option<Arc<Mutex<Application>>> {
        apps.get(id).cloned()
    }

    /// Acquires the per-application lock, runs `f` against the live
    /// application, and leaves the mutation in place on return — the lock
    /// guard IS the persistence boundary, so there is no separate `store`
    /// call to forget. Released on every exit path, including `f` returning
    /// `Err`.
    pub async fn lock_or_throw<F, T>(&self, id: &ApplicationId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Application) -> Result<T>,
    {
        let slot = {
            let apps = self.apps.read().await;
            self.slot(&apps, id)
        };
        let slot = slot.ok_or_else(|| TriggerError::UnknownApplication {
            application: id.clone(),
        })?;
        let mut guard = slot.lock().await;
        f(&mut guard)
    }

    /// Same as `lock_or_throw`, but returns `None` instead of an error when
    /// the application is absent — used by entry points that should simply
    /// no-op on an unknown application (the reconciler logs and drops).
    pub async fn lock_if_present<F, T>(&self, id: &ApplicationId, f: F) -> Option<Result<T>>
    where
        F: FnOnce(&mut Application) -> Result<T>,
    {
        let slot = {
            let apps = self.apps.read().await;
            self.slot(&apps, id)
        };
        match slot {
            Some(slot) => {
                let mut guard = slot.lock().await;
                Some(f(&mut guard))
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deployment_steps::DeploymentSpec;

    fn bare_spec() -> DeploymentSpec {
        DeploymentSpec {
            tests: true,
            steps: vec![],
            block_windows: vec![],
        }
    }

    #[tokio::test]
    async fn unknown_application_is_none() {
        let repo = ApplicationRepository::new();
        assert!(repo.get(&ApplicationId::new("acme", "web")).await.is_none());
    }

    #[tokio::test]
    async fn lock_or_throw_mutates_in_place() {
        let repo = ApplicationRepository::new();
        let id = ApplicationId::new("acme", "web");
        repo.insert(Application::new(id.clone(), bare_spec(), Some("proj".into()))).await;

        repo.lock_or_throw(&id, |app| {
            app.project_id = Some("proj-2".into());
            Ok(())
        })
        .await
        .unwrap();

        let reloaded = repo.require(&id).await.unwrap();
        assert_eq!(reloaded.project_id.as_deref(), Some("proj-2"));
    }

    #[tokio::test]
    async fn lock_or_throw_on_unknown_application_errors() {
        let repo = ApplicationRepository::new();
        let id = ApplicationId::new("acme", "ghost");
        let result = repo.lock_or_throw(&id, |_| Ok(())).await;
        assert!(matches!(result, Err(TriggerError::UnknownApplication { .. })));
    }
}
