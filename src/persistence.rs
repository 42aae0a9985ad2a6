//! Saving and loading a `System` snapshot as a single JSON document (spec.md §4.7, §6).

use std::fs;
use std::path::Path;

use crate::system::SystemSnapshot;

/// Writes `snapshot` to `path` as pretty-printed JSON.
pub fn save(snapshot: &SystemSnapshot, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json)?;
    Ok(())
}

/// Reads a `SystemSnapshot` back from `path`.
pub fn load(path: impl AsRef<Path>) -> anyhow::Result<SystemSnapshot> {
    let data = fs::read_to_string(path)?;
    let snapshot = serde_json::from_str(&data)?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::{Coin, Status};

    fn sample_snapshot() -> SystemSnapshot {
        let mut snapshot = SystemSnapshot::default();
        snapshot.bad_accept_count = 2;
        snapshot.fractal_counter = 5;
        snapshot.coins.insert(
            "c1".into(),
            Coin {
                id: "c1".into(),
                amount: 1.5,
                status: Status::Run,
                coin_type: 0,
                next: String::new(),
                prev: String::new(),
                owner: "t1".into(),
                cooperation_id: String::new(),
            },
        );
        snapshot
    }

    #[test]
    fn round_trips_through_a_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.json");
        let snapshot = sample_snapshot();

        save(&snapshot, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.bad_accept_count, snapshot.bad_accept_count);
        assert_eq!(loaded.fractal_counter, snapshot.fractal_counter);
        assert_eq!(loaded.coins, snapshot.coins);
    }

    #[test]
    fn load_rejects_a_missing_file() {
        assert!(load("/nonexistent/path/system.json").is_err());
    }
}
