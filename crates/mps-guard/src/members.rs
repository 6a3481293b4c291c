use anyhow::Context;
use guard_core::{PrincipalId, RoleId};
use officer_sweep::{InMemoryDirectory, MembershipDirectory, ResolveFuture};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub type MemberRoles = HashMap<PrincipalId, BTreeSet<RoleId>>;

/// Parses `{"<member id>": [<role id>, ...], ...}`.
pub fn parse_members(raw: &str) -> anyhow::Result<MemberRoles> {
    let parsed: HashMap<String, Vec<RoleId>> =
        serde_json::from_str(raw).context("membership snapshot is not a JSON object of role lists")?;
    parsed
        .into_iter()
        .map(|(key, roles)| {
            let id = key
                .parse::<PrincipalId>()
                .with_context(|| format!("member id {key:?} is not numeric"))?;
            Ok((id, roles.into_iter().collect()))
        })
        .collect()
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
}

/// Membership backed by a snapshot file that an external exporter rewrites.
/// A snapshot that fails to parse is ignored and the last good one stays
/// until the file changes again.
pub struct FileDirectory {
    path: PathBuf,
    members: InMemoryDirectory,
    seen_mtime: Mutex<Option<SystemTime>>,
}

impl FileDirectory {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading membership snapshot {}", path.display()))?;
        let members = InMemoryDirectory::new();
        members.replace_all(parse_members(&raw)?);
        info!(path = %path.display(), members = members.len(), "loaded membership snapshot");
        let seen_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        Ok(Self {
            seen_mtime: Mutex::new(seen_mtime),
            path,
            members,
        })
    }

    /// Re-reads the snapshot if its mtime moved since the last attempt.
    /// Returns whether the file was read.
    pub async fn refresh(&self) -> bool {
        let mut seen = self.seen_mtime.lock().await;
        let current = modified(&self.path).await;
        if current.is_none() || current == *seen {
            return false;
        }
        *seen = current;

        let parsed = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|raw| parse_members(&raw));
        match parsed {
            Ok(members) => {
                info!(members = members.len(), "membership snapshot changed, reloaded");
                self.members.replace_all(members);
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "keeping previous membership snapshot");
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }
}

impl MembershipDirectory for FileDirectory {
    fn resolve(&self, principal_id: PrincipalId) -> ResolveFuture<'_> {
        Box::pin(async move {
            self.refresh().await;
            self.members.resolve(principal_id).await
        })
    }
}
