//! Settings migrator: forward-only, version-gated field additions.
//!
//! Steps only add fields that are absent, so no step can destroy data and
//! each is safe to re-run. The chain as a whole runs once: a record already
//! at (or past) the target version is left untouched and not rewritten.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use super::store::SettingsStore;
use super::version::SchemaVersion;
use super::{SettingsRecord, CURRENT_VERSION, DEFAULT_SNIPPET_SIZE};

type MigrationFn = fn(&mut SettingsRecord);

/// Which stored versions a step applies to
#[derive(Debug, Clone, Copy)]
enum Gate {
    AtMost(&'static str),
    Below(&'static str),
}

impl Gate {
    fn applies_to(&self, stored: &SchemaVersion) -> bool {
        match self {
            Gate::AtMost(v) => *stored <= SchemaVersion::parse(v),
            Gate::Below(v) => *stored < SchemaVersion::parse(v),
        }
    }
}

/// All steps in ascending gate order
const MIGRATIONS: [(Gate, &str, MigrationFn); 5] = [
    (Gate::AtMost("0.3"), "paywall_display_options", add_display_options),
    (Gate::AtMost("0.4.5"), "integration_method", add_integration_method),
    (Gate::Below("1.0"), "multi_paywall", add_multi_paywall),
    (Gate::Below("1.2"), "server_side_validation", add_server_side_validation),
    (Gate::Below("1.7"), "signing_key", add_signing_key),
];

fn add_display_options(record: &mut SettingsRecord) {
    record
        .paywall_display_type
        .get_or_insert_with(|| "redirect".to_string());
    record.paywall_box.get_or_insert_with(String::new);
    record.paywall_snippet_size.get_or_insert(DEFAULT_SNIPPET_SIZE);
}

fn add_integration_method(record: &mut SettingsRecord) {
    record
        .paywall_integration_method
        .get_or_insert_with(|| "auto".to_string());
}

fn add_multi_paywall(record: &mut SettingsRecord) {
    record.api_key.get_or_insert_with(String::new);
    record.paywalls.get_or_insert_with(Vec::new);
}

fn add_server_side_validation(record: &mut SettingsRecord) {
    record.paywall_server_side_validation.get_or_insert(true);
}

fn add_signing_key(record: &mut SettingsRecord) {
    if record.signing_key.is_none() {
        record.signing_key = Some(record.api_key.clone().unwrap_or_default());
    }
}

/// What a migration run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub from: String,
    pub to: String,
    pub applied: Vec<&'static str>,
}

/// Walks a settings record up to a target schema version
#[derive(Debug, Clone)]
pub struct SettingsMigrator {
    target: SchemaVersion,
}

impl SettingsMigrator {
    /// Migrator targeting this build's schema version
    pub fn new() -> Self {
        Self::with_target(CURRENT_VERSION)
    }

    pub fn with_target(target: &str) -> Self {
        Self {
            target: SchemaVersion::parse(target),
        }
    }

    /// Pure upgrade. `None` when the record is already at or past the target.
    pub fn migrate(&self, record: SettingsRecord) -> Option<(SettingsRecord, MigrationReport)> {
        let stored = record.schema_version();
        if stored >= self.target {
            return None;
        }

        let (mut record, applied) = MIGRATIONS
            .iter()
            .filter(|(gate, _, _)| gate.applies_to(&stored))
            .fold((record, Vec::new()), |(mut record, mut applied), (_, name, step)| {
                debug!("Applying settings migration: {}", name);
                step(&mut record);
                applied.push(*name);
                (record, applied)
            });

        record.version = Some(self.target.to_string());

        let report = MigrationReport {
            from: stored.to_string(),
            to: self.target.to_string(),
            applied,
        };
        Some((record, report))
    }

    /// Migrate the stored record in place.
    ///
    /// No record means first activation: nothing to migrate. The upgraded
    /// record replaces the old one in a single save.
    pub fn run(&self, store: &dyn SettingsStore) -> Result<Option<MigrationReport>> {
        let Some(record) = store.load_record()? else {
            debug!("No settings stored, skipping migration");
            return Ok(None);
        };

        match self.migrate(record) {
            None => {
                debug!("Settings schema is up to date");
                Ok(None)
            }
            Some((record, report)) => {
                store.invalidate_cache();
                store.save_record(&record)?;
                info!(
                    "Migrated settings v{} -> v{} ({} steps: {})",
                    report.from,
                    report.to,
                    report.applied.len(),
                    report.applied.join(", ")
                );
                Ok(Some(report))
            }
        }
    }
}

impl Default for SettingsMigrator {
    fn default() -> Self {
        Self::new()
    }
}
