//! Persisted agent state snapshot: owned programs and cumulative stats,
//! restored on boot and rewritten by the persistence loop every 30s.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::program::Program;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_trades_completed: u64,
    pub total_sats_earned: u64,
    pub total_sats_spent: u64,
    pub programs_created: u64,
    pub programs_sold: u64,
    pub programs_bought: u64,
    pub trades_failed: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AgentStateSnapshot {
    pub tick_count: u64,
    pub programs: Vec<Program>,
    pub stats: Stats,
}

impl AgentStateSnapshot {
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = state_path(data_dir);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = state_path(data_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn state_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_state_file_yields_default_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = AgentStateSnapshot::load(dir.path()).unwrap();
        assert_eq!(snapshot.tick_count, 0);
        assert!(snapshot.programs.is_empty());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut snapshot = AgentStateSnapshot::default();
        snapshot.tick_count = 7;
        snapshot.stats.programs_created = 3;
        snapshot.save(dir.path()).unwrap();

        let reloaded = AgentStateSnapshot::load(dir.path()).unwrap();
        assert_eq!(reloaded.tick_count, 7);
        assert_eq!(reloaded.stats.programs_created, 3);
    }
}
