//! Target registry: monitored endpoints and their check histories.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::file::{load_or_default, write_atomic, DbError};
use super::models::{Observation, TargetRecord};

type Targets = IndexMap<String, TargetRecord>;

/// Trim an endpoint name and reject empty ones.
pub fn normalize_endpoint(raw: &str) -> Result<&str, DbError> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(DbError::EmptyEndpoint);
    }
    Ok(endpoint)
}

/// Thread-safe, file-backed registry of monitored endpoints.
///
/// Every mutation rewrites the whole file. A change is rolled back in memory when its write
/// fails, so the map always matches what is on disk.
pub struct Registry {
    path: PathBuf,
    targets: Mutex<Targets>,
}

impl Registry {
    /// Open the registry stored at `path`. A missing file is an empty registry.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let targets: Targets = load_or_default(&path)?;
        tracing::debug!("Loaded {} endpoints from {}", targets.len(), path.display());
        Ok(Self {
            path,
            targets: Mutex::new(targets),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Targets> {
        self.targets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an endpoint with an empty history.
    ///
    /// Returns `false` when it was already registered; its history is kept.
    pub fn add(&self, endpoint: &str) -> Result<bool, DbError> {
        let endpoint = normalize_endpoint(endpoint)?;
        let mut targets = self.lock();
        if targets.contains_key(endpoint) {
            return Ok(false);
        }

        targets.insert(endpoint.to_string(), TargetRecord::default());
        if let Err(e) = write_atomic(&self.path, &*targets) {
            targets.pop();
            return Err(e);
        }
        Ok(true)
    }

    /// Unregister an endpoint and drop its history. Returns `false` if it was not registered.
    pub fn remove(&self, endpoint: &str) -> Result<bool, DbError> {
        let endpoint = endpoint.trim();
        let mut targets = self.lock();
        if !targets.contains_key(endpoint) {
            return Ok(false);
        }

        let mut next = targets.clone();
        next.shift_remove(endpoint);
        write_atomic(&self.path, &next)?;
        *targets = next;
        Ok(true)
    }

    /// Registered endpoints in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check history of a registered endpoint.
    pub fn history(&self, endpoint: &str) -> Option<Vec<Observation>> {
        self.lock()
            .get(endpoint.trim())
            .map(|record| record.checks.clone())
    }

    /// Copy of the full registry contents.
    #[cfg(test)]
    pub fn snapshot(&self) -> Targets {
        self.lock().clone()
    }

    /// Drop `observation` again if it is still the endpoint's latest check.
    ///
    /// Used when the matching log entry could not be written. Returns whether a check was
    /// removed.
    pub fn retract_observation(
        &self,
        endpoint: &str,
        observation: &Observation,
    ) -> Result<bool, DbError> {
        let mut targets = self.lock();
        let is_latest = targets
            .get(endpoint)
            .and_then(|record| record.checks.last())
            .is_some_and(|last| last == observation);
        if !is_latest {
            return Ok(false);
        }

        let mut next = targets.clone();
        if let Some(record) = next.get_mut(endpoint) {
            record.checks.pop();
        }
        write_atomic(&self.path, &next)?;
        *targets = next;
        Ok(true)
    }

    /// Append an observation to an endpoint's history.
    ///
    /// Returns the stored observation, or `None` when the endpoint is no longer
    /// registered. A timestamp older than the last check is raised to it so the
    /// history stays ordered.
    pub fn record_observation(
        &self,
        endpoint: &str,
        mut observation: Observation,
    ) -> Result<Option<Observation>, DbError> {
        let mut targets = self.lock();
        let Some(record) = targets.get_mut(endpoint) else {
            return Ok(None);
        };

        if let Some(last) = record.checks.last() {
            if observation.timestamp < last.timestamp {
                tracing::debug!("Clock went backwards for {}, clamping timestamp", endpoint);
                observation.timestamp = last.timestamp;
            }
        }
        record.checks.push(observation.clone());

        if let Err(e) = write_atomic(&self.path, &*targets) {
            if let Some(record) = targets.get_mut(endpoint) {
                record.checks.pop();
            }
            return Err(e);
        }
        Ok(Some(observation))
    }
}
