use std::{fs, path::PathBuf};

use anyhow::Context as _;

use crate::error::CardLabResult;

/// Durable storage for named state records. The pipeline owns two records:
/// the app configuration and the result grid. A missing record is "never
/// written", which callers treat as an empty default.
pub trait StatePersistence: Send + Sync {
    fn load(&self, record: &str) -> CardLabResult<Option<Vec<u8>>>;
    fn save(&self, record: &str, bytes: &[u8]) -> CardLabResult<()>;
}

/// File-backed persistence: one `<record>.json` per record under a state
/// directory. Writes go through a temp file and rename so a crash mid-write
/// never leaves a torn record behind.
#[derive(Clone, Debug)]
pub struct JsonFileState {
    dir: PathBuf,
}

impl JsonFileState {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, record: &str) -> PathBuf {
        self.dir.join(format!("{record}.json"))
    }
}

impl StatePersistence for JsonFileState {
    fn load(&self, record: &str) -> CardLabResult<Option<Vec<u8>>> {
        let path = self.record_path(record);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("read state record '{}'", path.display()))
                .into()),
        }
    }

    fn save(&self, record: &str, bytes: &[u8]) -> CardLabResult<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create state dir '{}'", self.dir.display()))?;

        let path = self.record_path(record);
        let tmp = self.dir.join(format!("{record}.json.tmp"));
        fs::write(&tmp, bytes)
            .with_context(|| format!("write state record '{}'", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("commit state record '{}'", path.display()))?;
        Ok(())
    }
}

/// Discards every write and loads nothing. Used by offline renders and tests
/// that do not care about durability.
#[derive(Clone, Copy, Debug, Default)]
pub struct EphemeralState;

impl StatePersistence for EphemeralState {
    fn load(&self, _record: &str) -> CardLabResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn save(&self, _record: &str, _bytes: &[u8]) -> CardLabResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "cardlab_{name}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn missing_record_loads_none() {
        let state = JsonFileState::new(temp_dir("persist_missing"));
        assert!(state.load("config").unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = temp_dir("persist_roundtrip");
        let state = JsonFileState::new(&dir);
        state.save("results", b"{\"a\":1}").unwrap();
        assert_eq!(state.load("results").unwrap().unwrap(), b"{\"a\":1}");

        // A second save overwrites in place.
        state.save("results", b"{}").unwrap();
        assert_eq!(state.load("results").unwrap().unwrap(), b"{}");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = temp_dir("persist_tmp");
        let state = JsonFileState::new(&dir);
        state.save("config", b"{}").unwrap();
        assert!(!dir.join("config.json.tmp").exists());
        fs::remove_dir_all(&dir).ok();
    }
}
