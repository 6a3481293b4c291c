use crate::backing;
use guard_core::{IdentityLink, PrincipalId};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while loading or persisting identity links.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read link store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to persist link store {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Identity links held in memory and mirrored to a flat file.
///
/// Every mutation rewrites the full file. The in-memory mapping only changes
/// once that write has succeeded, so memory and disk never diverge.
#[derive(Debug)]
pub struct IdentityLinkStore {
    path: PathBuf,
    links: Vec<IdentityLink>,
}

impl IdentityLinkStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let links = backing::load_file(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), links = links.len(), "loaded identity links");
        Ok(Self { path, links })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn lookup_by_principal(&self, principal_id: PrincipalId) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.principal_id == principal_id)
            .map(|l| l.external_name.as_str())
    }

    /// First link in insertion order whose name matches exactly.
    pub fn lookup_by_external_name(&self, external_name: &str) -> Option<PrincipalId> {
        self.links
            .iter()
            .find(|l| l.external_name == external_name)
            .map(|l| l.principal_id)
    }

    pub fn upsert(
        &mut self,
        principal_id: PrincipalId,
        external_name: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut next = self.without(principal_id);
        next.push(IdentityLink::new(principal_id, external_name));
        self.commit(next)?;
        debug!(principal = %principal_id, "upserted identity link");
        Ok(())
    }

    /// Removes every link for `principal_id`. The file is rewritten even when
    /// nothing matched. Returns whether a link was dropped.
    pub fn remove(&mut self, principal_id: PrincipalId) -> Result<bool, StoreError> {
        let next = self.without(principal_id);
        let removed = next.len() != self.links.len();
        self.commit(next)?;
        if removed {
            debug!(principal = %principal_id, "removed identity link");
        }
        Ok(removed)
    }

    pub fn snapshot(&self) -> Vec<IdentityLink> {
        self.links.clone()
    }

    fn without(&self, principal_id: PrincipalId) -> Vec<IdentityLink> {
        self.links
            .iter()
            .filter(|l| l.principal_id != principal_id)
            .cloned()
            .collect()
    }

    fn commit(&mut self, next: Vec<IdentityLink>) -> Result<(), StoreError> {
        backing::write_file(&self.path, &next).map_err(|source| StoreError::Persist {
            path: self.path.clone(),
            source,
        })?;
        self.links = next;
        Ok(())
    }
}
