// src/config.rs
use chrono_tz::Tz;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::migrate::{anchor::UnknownInterval, MergedColumns, MigrationContext, Stage};
use crate::table::join::{DuplicateKeys, JoinSpec};

/// Everything one run needs: file locations, join keys, timezone and policies.
///
/// Loaded from YAML with every field optional; missing fields take the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory all file names are resolved against.
    pub data_dir: PathBuf,
    pub client_file: String,
    pub provider_file: String,
    pub merge_output_file: String,
    pub migration_input_file: String,
    pub migration_output_file: String,
    /// IANA timezone name.
    pub timezone: String,
    pub stage: Option<Stage>,
    pub client_key: String,
    pub provider_key: String,
    pub client_prefix: String,
    pub provider_prefix: String,
    pub duplicate_keys: DuplicateKeys,
    pub unknown_interval: UnknownInterval,
    /// Row transform threads; unset uses one per core.
    pub workers: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            client_file: "clientData.csv".into(),
            provider_file: "stripeData.csv".into(),
            merge_output_file: "mergedData.csv".into(),
            migration_input_file: "mergedData.csv".into(),
            migration_output_file: "migrationData.csv".into(),
            timezone: "America/Halifax".into(),
            stage: None,
            client_key: "CustomerId".into(),
            provider_key: "old id".into(),
            client_prefix: "c_".into(),
            provider_prefix: "s_".into(),
            duplicate_keys: DuplicateKeys::default(),
            unknown_interval: UnknownInterval::default(),
            workers: None,
        }
    }
}

impl Settings {
    /// Read settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| MigrateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_yaml::from_str(&text).map_err(|source| MigrateError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn data_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| MigrateError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn join_spec(&self) -> JoinSpec<'_> {
        JoinSpec {
            left_prefix: &self.client_prefix,
            right_prefix: &self.provider_prefix,
            left_key: &self.client_key,
            right_key: &self.provider_key,
            duplicates: self.duplicate_keys,
        }
    }

    pub fn merged_columns(&self) -> MergedColumns {
        MergedColumns::new(&self.client_prefix, &self.provider_prefix, &self.client_key)
    }

    /// Resolve the timezone and bundle the transform inputs.
    pub fn migration_context(&self) -> Result<MigrationContext> {
        Ok(MigrationContext {
            timezone: self.timezone()?,
            stage: self.stage,
            unknown_interval: self.unknown_interval,
            columns: self.merged_columns(),
            workers: self.workers,
        })
    }
}
