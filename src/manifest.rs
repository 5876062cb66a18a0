//! Fleet manifest: the static description of every child process the
//! supervisor knows how to spawn, loaded from `config/agents.json`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// When a child should be restarted after it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Always,
    OnFailure,
    Never,
}

/// The role a child plays, used only to order startup phases: infra first,
/// then agents, staggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildKind {
    Infra,
    Agent,
}

/// One entry in the manifest: a single child process the supervisor manages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildSpec {
    pub id: String,
    pub display_name: String,
    pub kind: ChildKind,
    /// Full command line, shell-split at spawn time (first token is argv[0]).
    pub command: String,
    pub restart_policy: RestartPolicy,
    /// TCP port to probe for readiness after spawn (infra children only).
    #[serde(default)]
    pub ready_port: Option<u16>,
    #[serde(default)]
    pub working_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub children: Vec<ChildSpec>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        let manifest: Manifest = serde_json::from_str(&raw).map_err(Error::Json)?;
        Ok(manifest)
    }

    /// Infra children in manifest order, then agent children ordered by
    /// ascending numeric suffix of `id` where possible, else manifest order.
    pub fn infra(&self) -> impl Iterator<Item = &ChildSpec> {
        self.children.iter().filter(|c| c.kind == ChildKind::Infra)
    }

    pub fn agents(&self) -> impl Iterator<Item = &ChildSpec> {
        self.children.iter().filter(|c| c.kind == ChildKind::Agent)
    }

    pub fn find(&self, id: &str) -> Option<&ChildSpec> {
        self.children.iter().find(|c| c.id == id)
    }
}

/// Walk up from `start` looking for a directory containing `config/agents.json`,
/// mirroring the original control CLI's project-root discovery.
pub fn find_project_dir(start: &Path) -> Option<std::path::PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join("config").join("agents.json").is_file() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_shipped_manifest() {
        let raw = std::fs::read_to_string(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/agents.json"),
        )
        .unwrap();
        let manifest: Manifest = serde_json::from_str(&raw).unwrap();
        assert_eq!(manifest.infra().count(), 2);
        assert_eq!(manifest.agents().count(), 10);
        assert!(manifest.find("agent-3").is_some());
        assert!(manifest.find("agent-99").is_none());
    }

    #[test]
    fn find_project_dir_walks_up() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("config")).unwrap();
        std::fs::write(tmp.path().join("config/agents.json"), "{}").unwrap();
        let nested = tmp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_project_dir(&nested), Some(tmp.path().to_path_buf()));
    }
}
