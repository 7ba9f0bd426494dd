//! On-disk durable store backed by redb.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use redb::{Database, TableDefinition};

use super::DurableStore;

const FALLBACK_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("fallback");
const DB_FILE_NAME: &str = "fallback.redb";

pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl RedbStore {
    /// Open (or create) `fallback.redb` inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        let path = data_dir.join(DB_FILE_NAME);
        let db = Database::create(&path)
            .with_context(|| format!("Failed to open fallback database {}", path.display()))?;
        // Ensure table exists
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(FALLBACK_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db, path })
    }

    /// `{data_dir}/townhall`, or the configured override.
    pub fn default_dir(configured: Option<&str>) -> Result<PathBuf> {
        match configured {
            Some(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir)),
            _ => Ok(dirs::data_dir()
                .context("Failed to get data directory")?
                .join("townhall")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DurableStore for RedbStore {
    fn backend_name(&self) -> &str {
        "redb"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let rtxn = self.db.begin_read()?;
        let table = rtxn.open_table(FALLBACK_TABLE)?;
        Ok(table.get(key)?.map(|v| v.value().to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FALLBACK_TABLE)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FALLBACK_TABLE)?;
            table.remove(key)?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path()).unwrap();

        assert_eq!(store.get("votes").unwrap(), None);
        store.put("votes", b"[]").unwrap();
        assert_eq!(store.get("votes").unwrap(), Some(b"[]".to_vec()));
        store.put("votes", b"[1]").unwrap();
        assert_eq!(store.get("votes").unwrap(), Some(b"[1]".to_vec()));
        store.remove("votes").unwrap();
        assert_eq!(store.get("votes").unwrap(), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RedbStore::open(dir.path()).unwrap();
            store.put("adminMode", b"true").unwrap();
        }
        let store = RedbStore::open(dir.path()).unwrap();
        assert_eq!(store.get("adminMode").unwrap(), Some(b"true".to_vec()));
        assert!(store.path().ends_with(DB_FILE_NAME));
    }

    #[test]
    fn test_default_dir_override() {
        let dir = RedbStore::default_dir(Some("/tmp/townhall-data")).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/townhall-data"));
    }
}
