//! Composite persistence
//!
//! Rendering and storing are separate phases: a store only ever sees encoded
//! bytes, so a failed write cannot touch an already rendered composite.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ChekiError, Result};
use crate::layout::EncodedComposite;
use crate::session::Session;

/// Opaque identifier returned for each stored buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredId(pub String);

impl fmt::Display for StoredId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifiers of both stored variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredComposite {
    pub primary: StoredId,
    pub secondary: StoredId,
}

/// Persistence collaborator
pub trait CompositeStore: Send + Sync {
    /// Store one encoded buffer under `target` and return its identifier
    fn put(&self, session: &Session, target: &str, name: &str, bytes: &[u8]) -> Result<StoredId>;
}

/// File names for a composite pair stored at `millis`
pub fn composite_names(millis: i64) -> (String, String) {
    (
        format!("AI_Cheki_Real_{}.png", millis),
        format!("AI_Cheki_Ai_{}.png", millis),
    )
}

/// File name for a single generated image stored at `millis`
pub fn generated_name(millis: i64) -> String {
    format!("{}-AIphoto.png", millis)
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Store both variants of a composite
pub fn store_composite(
    store: &dyn CompositeStore,
    session: &Session,
    target: &str,
    encoded: &EncodedComposite,
) -> Result<StoredComposite> {
    let (primary_name, secondary_name) = composite_names(now_millis());
    let primary = store.put(session, target, &primary_name, &encoded.primary_png)?;
    let secondary = store.put(session, target, &secondary_name, &encoded.secondary_png)?;
    Ok(StoredComposite { primary, secondary })
}

/// Writes buffers below a root directory; the target is a relative subdirectory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, target: &str) -> Result<PathBuf> {
        let relative = Path::new(target);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ChekiError::Store {
                target: target.to_string(),
                reason: "target must be a relative path inside the store".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl CompositeStore for DirectoryStore {
    fn put(&self, session: &Session, target: &str, name: &str, bytes: &[u8]) -> Result<StoredId> {
        let store_error = |reason: String| ChekiError::Store {
            target: format!("{}/{}", target, name),
            reason,
        };

        let dir = self.resolve(target)?;
        fs::create_dir_all(&dir).map_err(|e| store_error(e.to_string()))?;

        let path = dir.join(name);
        let partial = dir.join(format!(".{}.partial", name));
        fs::write(&partial, bytes).map_err(|e| store_error(e.to_string()))?;
        fs::rename(&partial, &path).map_err(|e| store_error(e.to_string()))?;

        tracing::info!(
            session = %session.id,
            path = %path.display(),
            size = bytes.len(),
            "Stored buffer"
        );
        Ok(StoredId(path.display().to_string()))
    }
}
