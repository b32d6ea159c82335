use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A serialized, pre-trained artifact that can be decoded from its file bytes.
///
/// `decode` covers both the wire format and the schema checks; any error it
/// returns marks the artifact as unusable.
pub trait Artifact: Sized {
    const LABEL: &'static str;

    fn decode(bytes: &[u8]) -> Result<Self, String>;
}

/// Outcome of one load attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    Loaded { sha256: String },
    Missing,
    Failed { reason: String },
}

impl ArtifactStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ArtifactStatus::Loaded { .. })
    }
}

/// Resolves artifact files against a model directory.
///
/// Loading never fails past this boundary: every problem is recorded as an
/// `ArtifactStatus` and the caller receives `None`.
pub struct ArtifactLoader {
    dir: PathBuf,
    statuses: BTreeMap<String, ArtifactStatus>,
}

impl ArtifactLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            statuses: BTreeMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load and decode `file_name`. Loading the same file again replaces its status.
    pub fn load<A: Artifact>(&mut self, file_name: &str) -> Option<A> {
        let path = self.dir.join(file_name);
        let (artifact, status) = load_artifact::<A>(&path);
        self.statuses.insert(file_name.to_string(), status);
        artifact
    }

    pub fn status(&self, file_name: &str) -> Option<&ArtifactStatus> {
        self.statuses.get(file_name)
    }

    pub fn statuses(&self) -> &BTreeMap<String, ArtifactStatus> {
        &self.statuses
    }

    pub fn into_statuses(self) -> BTreeMap<String, ArtifactStatus> {
        self.statuses
    }
}

/// Read, fingerprint and decode a single artifact file.
pub fn load_artifact<A: Artifact>(path: &Path) -> (Option<A>, ArtifactStatus) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No {} artifact at {}", A::LABEL, path.display());
            return (None, ArtifactStatus::Missing);
        }
        Err(e) => {
            warn!("Could not read {} artifact {}: {}", A::LABEL, path.display(), e);
            return (None, ArtifactStatus::Failed { reason: e.to_string() });
        }
    };

    let sha256 = hex::encode(Sha256::digest(&bytes));

    match A::decode(&bytes) {
        Ok(artifact) => {
            info!("Loaded {} artifact from {} (sha256 {})", A::LABEL, path.display(), &sha256[..12]);
            (Some(artifact), ArtifactStatus::Loaded { sha256 })
        }
        Err(reason) => {
            warn!("Could not load {} artifact {}: {}", A::LABEL, path.display(), reason);
            (None, ArtifactStatus::Failed { reason })
        }
    }
}

/// Decode JSON and surface serde errors as plain strings.
pub fn decode_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    serde_json::from_slice(bytes).map_err(|e| format!("invalid artifact JSON: {}", e))
}

pub fn ensure_all_finite(name: &str, values: &[f64]) -> Result<(), String> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(format!("{}[{}] is not finite", name, i)),
        None => Ok(()),
    }
}
