// ============================================================================
// IterasDb - Embedded Database (redb)
// ============================================================================
// Persistent storage for the settings record and per-content paywall metadata.
// Default path: ~/.iteras/iteras.redb (override via ITERAS_DB_PATH env var)
// ============================================================================

pub mod types;

pub use types::{DbStats, MetaMigrationStats};

use anyhow::{anyhow, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

use crate::content::{MetaUpgrade, PaywallMeta};
use crate::settings::{SettingsRecord, SettingsStore, SETTINGS_KEY};

// Table definitions
const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");
const PAYWALL_META: TableDefinition<&str, &[u8]> = TableDefinition::new("paywall_meta");

/// Embedded database for the paywall integration
pub struct IterasDb {
    db: Database,
    path: PathBuf,
    settings_cache: RwLock<Option<SettingsRecord>>,
}

impl IterasDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses ITERAS_DB_PATH env var or ~/.iteras/iteras.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("ITERAS_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let iteras_dir = home.join(".iteras");
            std::fs::create_dir_all(&iteras_dir)
                .map_err(|e| anyhow!("Failed to create .iteras directory: {}", e))?;
            iteras_dir.join("iteras.redb")
        };

        info!("Opening database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        // Ensure tables exist by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn.open_table(SETTINGS).map_err(|e| anyhow!("Failed to create settings table: {}", e))?;
            let _ = write_txn.open_table(PAYWALL_META).map_err(|e| anyhow!("Failed to create paywall_meta table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self {
            db,
            path: db_path,
            settings_cache: RwLock::new(None),
        })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_settings(&self) -> Result<Option<SettingsRecord>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(SETTINGS)
            .map_err(|e| anyhow!("Failed to open settings table: {}", e))?;

        match table.get(SETTINGS_KEY).map_err(|e| anyhow!("Failed to get settings: {}", e))? {
            Some(value) => Ok(Some(SettingsRecord::from_json(value.value())
                .map_err(|e| anyhow!("Failed to deserialize settings: {}", e))?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Paywall Metadata Operations
    // ========================================================================

    /// Store the paywall declaration of a content item. `Absent` deletes it.
    pub fn store_paywall_meta(&self, content_id: &str, meta: &PaywallMeta) -> Result<()> {
        if *meta == PaywallMeta::Absent {
            self.delete_paywall_meta(content_id)?;
            return Ok(());
        }

        let value = serde_json::to_vec(meta)
            .map_err(|e| anyhow!("Failed to serialize paywall meta: {}", e))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn.open_table(PAYWALL_META)
                .map_err(|e| anyhow!("Failed to open paywall_meta table: {}", e))?;
            table.insert(content_id, value.as_slice())
                .map_err(|e| anyhow!("Failed to insert paywall meta: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored paywall meta for content: {}", content_id);
        Ok(())
    }

    pub fn get_paywall_meta(&self, content_id: &str) -> Result<PaywallMeta> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(PAYWALL_META)
            .map_err(|e| anyhow!("Failed to open paywall_meta table: {}", e))?;

        match table.get(content_id).map_err(|e| anyhow!("Failed to get paywall meta: {}", e))? {
            Some(value) => serde_json::from_slice(value.value())
                .map_err(|e| anyhow!("Failed to deserialize paywall meta: {}", e)),
            None => Ok(PaywallMeta::Absent),
        }
    }

    pub fn list_paywall_meta(&self) -> Result<Vec<(String, PaywallMeta)>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(PAYWALL_META)
            .map_err(|e| anyhow!("Failed to open paywall_meta table: {}", e))?;

        let mut results = Vec::new();
        let iter = table.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate paywall meta: {}", e))?;
        for entry in iter {
            let (key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let meta: PaywallMeta = serde_json::from_slice(value.value())
                .map_err(|e| anyhow!("Failed to deserialize paywall meta: {}", e))?;
            results.push((key.value().to_string(), meta));
        }
        Ok(results)
    }

    pub fn delete_paywall_meta(&self, content_id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed;
        {
            let mut table = write_txn.open_table(PAYWALL_META)
                .map_err(|e| anyhow!("Failed to open paywall_meta table: {}", e))?;
            removed = table.remove(content_id)
                .map_err(|e| anyhow!("Failed to remove paywall meta: {}", e))?
                .is_some();
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit delete: {}", e))?;

        if removed {
            debug!("Deleted paywall meta for content: {}", content_id);
        }
        Ok(removed)
    }

    /// Convert every legacy single-string declaration to an id list
    pub fn migrate_paywall_meta(&self, all_paywall_ids: &[String]) -> Result<MetaMigrationStats> {
        let mut stats = MetaMigrationStats::default();

        for (content_id, meta) in self.list_paywall_meta()? {
            match meta.upgrade(all_paywall_ids) {
                MetaUpgrade::Keep => {
                    debug!("Content {} paywall up-to-date", content_id);
                    stats.kept += 1;
                }
                MetaUpgrade::Set(ids) => {
                    debug!("Content {} paywall set to {:?}", content_id, ids);
                    self.store_paywall_meta(&content_id, &PaywallMeta::Ids(ids))?;
                    stats.updated += 1;
                }
                MetaUpgrade::Remove => {
                    debug!("Content {} paywall removed", content_id);
                    self.delete_paywall_meta(&content_id)?;
                    stats.removed += 1;
                }
            }
        }

        info!(
            "Migrated content paywalls: {} kept, {} updated, {} removed",
            stats.kept, stats.updated, stats.removed
        );
        Ok(stats)
    }

    // ========================================================================
    // Lifecycle Operations
    // ========================================================================

    /// Remove all content paywall metadata and the settings record
    pub fn reset(&self) -> Result<()> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let cleared;
        {
            let mut table = write_txn.open_table(PAYWALL_META)
                .map_err(|e| anyhow!("Failed to open paywall_meta table: {}", e))?;
            let mut keys = Vec::new();
            for entry in table.range::<&str>(..).map_err(|e| anyhow!("Failed to iterate paywall meta: {}", e))? {
                let (key, _) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
                keys.push(key.value().to_string());
            }
            for key in &keys {
                table.remove(key.as_str())
                    .map_err(|e| anyhow!("Failed to remove paywall meta: {}", e))?;
            }
            cleared = keys.len();

            let mut settings = write_txn.open_table(SETTINGS)
                .map_err(|e| anyhow!("Failed to open settings table: {}", e))?;
            settings.remove(SETTINGS_KEY)
                .map_err(|e| anyhow!("Failed to remove settings: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit reset: {}", e))?;
        self.invalidate_cache();

        info!("Reset: cleared {} content paywalls and settings", cleared);
        Ok(())
    }

    /// Remove the settings record only
    pub fn uninstall(&self) -> Result<bool> {
        self.delete_record()
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<DbStats> {
        let settings = self.read_settings()?;
        let metas = self.list_paywall_meta()?;

        Ok(DbStats {
            has_settings: settings.is_some(),
            settings_version: settings.and_then(|s| s.version),
            paywalled_content: metas.len(),
            legacy_content: metas
                .iter()
                .filter(|(_, m)| matches!(m, PaywallMeta::Legacy(_)))
                .count(),
        })
    }
}

impl SettingsStore for IterasDb {
    fn load_record(&self) -> Result<Option<SettingsRecord>> {
        if let Ok(cache) = self.settings_cache.read() {
            if let Some(record) = cache.as_ref() {
                return Ok(Some(record.clone()));
            }
        }

        let record = self.read_settings()?;
        if let (Some(record), Ok(mut cache)) = (record.as_ref(), self.settings_cache.write()) {
            *cache = Some(record.clone());
        }
        Ok(record)
    }

    fn save_record(&self, record: &SettingsRecord) -> Result<()> {
        let value = record.to_json()
            .map_err(|e| anyhow!("Failed to serialize settings: {}", e))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn.open_table(SETTINGS)
                .map_err(|e| anyhow!("Failed to open settings table: {}", e))?;
            table.insert(SETTINGS_KEY, value.as_slice())
                .map_err(|e| anyhow!("Failed to insert settings: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;
        self.invalidate_cache();

        debug!("Stored settings record");
        Ok(())
    }

    fn delete_record(&self) -> Result<bool> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed;
        {
            let mut table = write_txn.open_table(SETTINGS)
                .map_err(|e| anyhow!("Failed to open settings table: {}", e))?;
            removed = table.remove(SETTINGS_KEY)
                .map_err(|e| anyhow!("Failed to remove settings: {}", e))?
                .is_some();
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit delete: {}", e))?;
        self.invalidate_cache();

        if removed {
            debug!("Deleted settings record");
        }
        Ok(removed)
    }

    fn invalidate_cache(&self) {
        if let Ok(mut cache) = self.settings_cache.write() {
            *cache = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Settings, SettingsMigrator, CURRENT_VERSION};
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, IterasDb) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.redb");
        let db = IterasDb::open(Some(path.to_str().unwrap())).unwrap();
        (dir, db)
    }

    #[test]
    fn test_settings_round_trip() {
        let (_dir, db) = open_temp();
        assert!(db.load_record().unwrap().is_none());

        let mut settings = Settings::default();
        settings.signing_key = "k".into();
        settings.save(&db).unwrap();

        let loaded = Settings::load(&db);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_cache_is_invalidated_on_save() {
        let (_dir, db) = open_temp();
        let mut settings = Settings::default();
        settings.save(&db).unwrap();
        assert_eq!(Settings::load(&db).paywall_snippet_size, 300);

        settings.paywall_snippet_size = 80;
        settings.save(&db).unwrap();
        assert_eq!(Settings::load(&db).paywall_snippet_size, 80);
    }

    #[test]
    fn test_migration_through_db() {
        let (_dir, db) = open_temp();
        let record = SettingsRecord {
            api_key: Some("legacy".into()),
            version: Some("0.2".into()),
            ..Default::default()
        };
        db.save_record(&record).unwrap();

        let report = SettingsMigrator::new().run(&db).unwrap().unwrap();
        assert_eq!(report.applied.len(), 5);

        let stats = db.stats().unwrap();
        assert_eq!(stats.settings_version.as_deref(), Some(CURRENT_VERSION));
        assert_eq!(Settings::load(&db).signing_key, "legacy");
    }

    #[test]
    fn test_paywall_meta_crud() {
        let (_dir, db) = open_temp();
        db.store_paywall_meta("post-1", &PaywallMeta::ids(["a", "b"])).unwrap();
        db.store_paywall_meta("post-2", &PaywallMeta::Legacy("sub".into())).unwrap();

        assert_eq!(db.get_paywall_meta("post-1").unwrap(), PaywallMeta::ids(["a", "b"]));
        assert_eq!(db.get_paywall_meta("missing").unwrap(), PaywallMeta::Absent);
        assert_eq!(db.list_paywall_meta().unwrap().len(), 2);

        db.store_paywall_meta("post-1", &PaywallMeta::Absent).unwrap();
        assert_eq!(db.get_paywall_meta("post-1").unwrap(), PaywallMeta::Absent);
        assert!(!db.delete_paywall_meta("post-1").unwrap());
    }

    #[test]
    fn test_migrate_paywall_meta() {
        let (_dir, db) = open_temp();
        db.store_paywall_meta("keep", &PaywallMeta::ids(["x"])).unwrap();
        db.store_paywall_meta("all", &PaywallMeta::Legacy("user".into())).unwrap();
        db.store_paywall_meta("none", &PaywallMeta::Legacy("".into())).unwrap();
        db.store_paywall_meta("junk", &PaywallMeta::Legacy("whatever".into())).unwrap();

        let all = vec!["a".to_string(), "b".to_string()];
        let stats = db.migrate_paywall_meta(&all).unwrap();
        assert_eq!(stats, MetaMigrationStats { kept: 1, updated: 2, removed: 1 });

        assert_eq!(db.get_paywall_meta("all").unwrap(), PaywallMeta::ids(["a", "b"]));
        assert_eq!(db.get_paywall_meta("none").unwrap(), PaywallMeta::Ids(vec![]));
        assert_eq!(db.get_paywall_meta("junk").unwrap(), PaywallMeta::Absent);
        assert_eq!(db.stats().unwrap().legacy_content, 0);
    }

    #[test]
    fn test_reset_and_uninstall() {
        let (_dir, db) = open_temp();
        Settings::load_or_init(&db).unwrap();
        db.store_paywall_meta("post", &PaywallMeta::ids(["a"])).unwrap();

        db.reset().unwrap();
        let stats = db.stats().unwrap();
        assert!(!stats.has_settings);
        assert_eq!(stats.paywalled_content, 0);

        Settings::load_or_init(&db).unwrap();
        assert!(db.uninstall().unwrap());
        assert!(db.load_record().unwrap().is_none());
    }
}
