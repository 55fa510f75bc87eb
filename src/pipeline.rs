// src/pipeline.rs
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{info, instrument};

use crate::config::Settings;
use crate::error::Result;
use crate::migrate::transform;
use crate::table::{
    csv_io::{read_table, write_table},
    join::join,
};

/// Client columns the migration reads, besides the join key.
pub const CLIENT_COLUMNS: [&str; 3] = ["StartDateISO", "BillingInterval", "NextBillingDateISO"];
/// Provider column holding the customer id in the new billing system.
pub const PROVIDER_NEW_ID: &str = "new id";

/// Join the client and provider exports and write the merged table.
/// Returns the path written.
#[instrument(level = "info", skip_all)]
pub fn merge(settings: &Settings) -> Result<PathBuf> {
    let client = read_table(&settings.data_path(&settings.client_file))?;
    client.require_headers(
        &settings.client_file,
        std::iter::once(settings.client_key.as_str()).chain(CLIENT_COLUMNS),
    )?;

    let provider = read_table(&settings.data_path(&settings.provider_file))?;
    provider.require_headers(
        &settings.provider_file,
        [settings.provider_key.as_str(), PROVIDER_NEW_ID],
    )?;

    let merged = join(&client, &provider, &settings.join_spec())?;

    let out = settings.data_path(&settings.merge_output_file);
    write_table(&out, &merged)?;
    info!(path = %out.display(), rows = merged.len(), "wrote merged table");
    Ok(out)
}

/// Transform the merged table into the subscription import file.
/// Returns the path written.
#[instrument(level = "info", skip_all, fields(reference_time = %reference_time))]
pub fn migrate(settings: &Settings, reference_time: DateTime<Utc>) -> Result<PathBuf> {
    let ctx = settings.migration_context()?;

    let merged = read_table(&settings.data_path(&settings.migration_input_file))?;
    merged.require_headers(&settings.migration_input_file, ctx.columns.required())?;

    let migrated = transform(&merged, &ctx, reference_time)?;

    let out = settings.data_path(&settings.migration_output_file);
    write_table(&out, &migrated)?;
    info!(path = %out.display(), rows = migrated.len(), "wrote migration table");
    Ok(out)
}
