// src/migrate/mod.rs
pub mod anchor;
pub mod parallel;

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::error::{MigrateError, Result};
use crate::table::{Row, Table};
use anchor::{billing_cycle_anchor, UnknownInterval};

/// Columns of the subscription import file, in output order.
pub const OUTPUT_HEADERS: [&str; 11] = [
    "customer",
    "start_date",
    "price",
    "quantity",
    "automatic_tax",
    "billing_cycle_anchor",
    "coupon",
    "trial_end",
    "proration_behaviour",
    "collection_method",
    "cancel_at_period_end",
];

/// Deployment stage; only shifts the subscription start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Production,
    Development,
}

impl Stage {
    pub fn start_offset(self) -> TimeDelta {
        match self {
            Stage::Production => TimeDelta::hours(1),
            Stage::Development => TimeDelta::hours(1) + TimeDelta::minutes(30),
        }
    }
}

/// Names of the merged-table columns the transform reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedColumns {
    pub customer_id: String,
    pub billing_interval: String,
    pub next_billing_date: String,
    pub quantity: String,
    pub new_id: String,
}

impl MergedColumns {
    pub fn new(client_prefix: &str, provider_prefix: &str, client_key: &str) -> Self {
        let client = |name: &str| format!("{client_prefix}{name}");
        Self {
            customer_id: client(client_key),
            billing_interval: client("BillingInterval"),
            next_billing_date: client("NextBillingDateISO"),
            quantity: client("Quantity"),
            new_id: format!("{provider_prefix}new id"),
        }
    }

    /// Columns that must be present before a merged table can be migrated.
    pub fn required(&self) -> [&str; 3] {
        [
            self.billing_interval.as_str(),
            self.next_billing_date.as_str(),
            self.new_id.as_str(),
        ]
    }
}

impl Default for MergedColumns {
    fn default() -> Self {
        Self::new("c_", "s_", "CustomerId")
    }
}

/// Immutable per-run inputs to [`transform`].
#[derive(Debug, Clone)]
pub struct MigrationContext {
    pub timezone: Tz,
    /// `None` leaves `start_date` empty.
    pub stage: Option<Stage>,
    pub unknown_interval: UnknownInterval,
    pub columns: MergedColumns,
    pub workers: Option<usize>,
}

/// One row of the import file before it is flattened into a [`Row`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub customer: String,
    pub start_date: String,
    pub quantity: String,
    pub billing_cycle_anchor: String,
}

impl From<MigrationRecord> for Row {
    fn from(r: MigrationRecord) -> Self {
        // price mapping is done by hand after import
        [
            ("customer", r.customer),
            ("start_date", r.start_date),
            ("price", String::new()),
            ("quantity", r.quantity),
            ("automatic_tax", "false".to_string()),
            ("billing_cycle_anchor", r.billing_cycle_anchor),
            ("coupon", String::new()),
            ("trial_end", String::new()),
            ("proration_behaviour", String::new()),
            ("collection_method", "charge automatically".to_string()),
            ("cancel_at_period_end", "false".to_string()),
        ]
        .into_iter()
        .collect()
    }
}

/// Map every merged row to the import schema.
///
/// Rows are processed in parallel and emitted in input order. All dates are
/// derived from `reference_time`; a row that fails aborts the whole batch.
#[instrument(level = "info", skip_all, fields(rows = merged.len(), tz = %ctx.timezone))]
pub fn transform(
    merged: &Table,
    ctx: &MigrationContext,
    reference_time: DateTime<Utc>,
) -> Result<Table> {
    let now = reference_time.with_timezone(&ctx.timezone);
    let start_date = ctx
        .stage
        .map(|s| (now + s.start_offset()).timestamp().to_string())
        .unwrap_or_default();

    let records = parallel::try_map(merged.rows(), ctx.workers, |row| {
        migrate_row(row, ctx, now, &start_date)
    })?;

    let mut out = Table::new(OUTPUT_HEADERS);
    for record in records {
        out.push(record.into());
    }
    info!(rows = out.len(), "migrated rows");
    Ok(out)
}

fn migrate_row(
    row: &Row,
    ctx: &MigrationContext,
    now: DateTime<Tz>,
    start_date: &str,
) -> Result<MigrationRecord> {
    let cols = &ctx.columns;
    let customer = row.get(&cols.customer_id);
    debug!(customer, "processing row");

    let anchor = billing_cycle_anchor(
        row.get(&cols.billing_interval),
        row.get(&cols.next_billing_date),
        now,
        ctx.unknown_interval,
    )
    .map_err(|source| MigrateError::Anchor {
        customer: customer.to_string(),
        source,
    })?;

    Ok(MigrationRecord {
        customer: row.get(&cols.new_id).to_string(),
        start_date: start_date.to_string(),
        quantity: row.value(&cols.quantity).unwrap_or_default().to_string(),
        billing_cycle_anchor: anchor.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor::AnchorError;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn ctx(stage: Option<Stage>) -> MigrationContext {
        MigrationContext {
            timezone: chrono_tz::UTC,
            stage,
            unknown_interval: UnknownInterval::NoAdvance,
            columns: MergedColumns::default(),
            workers: None,
        }
    }

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    fn merged_row(id: &str, interval: &str, next: &str, quantity: Option<&str>) -> Row {
        let mut row: Row = [
            ("c_CustomerId", id),
            ("c_StartDateISO", "2024/01/01"),
            ("c_BillingInterval", interval),
            ("c_NextBillingDateISO", next),
            ("s_old id", id),
        ]
        .into_iter()
        .collect();
        row.insert("s_new id", format!("cus_{id}"));
        if let Some(q) = quantity {
            row.insert("c_Quantity", q);
        }
        row
    }

    fn merged(rows: Vec<Row>) -> Table {
        let mut table = Table::new([
            "c_CustomerId",
            "c_StartDateISO",
            "c_BillingInterval",
            "c_NextBillingDateISO",
            "s_old id",
            "s_new id",
        ]);
        for r in rows {
            table.push(r);
        }
        table
    }

    #[test]
    fn migrates_a_monthly_customer() -> anyhow::Result<()> {
        let input = merged(vec![merged_row("42", "Monthly", "2023/06/15", Some("2"))]);
        let out = transform(&input, &ctx(Some(Stage::Production)), reference())?;

        assert_eq!(out.headers(), OUTPUT_HEADERS);
        let row = &out.rows()[0];
        assert_eq!(row.get("customer"), "cus_42");
        assert_eq!(row.get("quantity"), "2");
        assert_eq!(
            row.get("billing_cycle_anchor"),
            Utc.with_ymd_and_hms(2023, 7, 15, 0, 0, 0)
                .unwrap()
                .timestamp()
                .to_string()
        );
        assert_eq!(
            row.get("start_date"),
            (reference().timestamp() + 3_600).to_string()
        );
        Ok(())
    }

    #[test]
    fn fixed_columns_ignore_input() -> anyhow::Result<()> {
        let mut noisy = merged_row("1", "Yearly", "2024/09/01", None);
        for col in ["c_price", "c_coupon", "s_trial_end", "price", "coupon"] {
            noisy.insert(col, "junk");
        }
        let out = transform(&merged(vec![noisy]), &ctx(None), reference())?;
        let row = &out.rows()[0];
        for empty in ["price", "coupon", "trial_end", "proration_behaviour"] {
            assert_eq!(row.get(empty), "", "{empty}");
        }
        assert_eq!(row.get("automatic_tax"), "false");
        assert_eq!(row.get("collection_method"), "charge automatically");
        assert_eq!(row.get("cancel_at_period_end"), "false");
        assert_eq!(row.len(), OUTPUT_HEADERS.len());
        Ok(())
    }

    #[test]
    fn start_date_depends_on_stage() -> anyhow::Result<()> {
        let input = merged(vec![merged_row("1", "Monthly", "2024/07/20", None)]);
        let base = reference().timestamp();

        let dev = transform(&input, &ctx(Some(Stage::Development)), reference())?;
        assert_eq!(dev.rows()[0].get("start_date"), (base + 5_400).to_string());

        let unset = transform(&input, &ctx(None), reference())?;
        assert_eq!(unset.rows()[0].get("start_date"), "");
        Ok(())
    }

    #[test]
    fn missing_quantity_is_empty() -> anyhow::Result<()> {
        let input = merged(vec![merged_row("1", "Monthly", "2024/07/20", None)]);
        let out = transform(&input, &ctx(None), reference())?;
        assert_eq!(out.rows()[0].value("quantity"), Some(""));
        Ok(())
    }

    #[test]
    fn one_output_row_per_input_row_in_order() -> anyhow::Result<()> {
        let rows = (0..500)
            .map(|i| merged_row(&i.to_string(), "Monthly", "2024/07/20", Some("1")))
            .collect();
        let mut c = ctx(Some(Stage::Production));
        c.workers = Some(4);
        let out = transform(&merged(rows), &c, reference())?;
        assert_eq!(out.len(), 500);
        for (i, row) in out.rows().iter().enumerate() {
            assert_eq!(row.get("customer"), format!("cus_{i}"));
        }
        Ok(())
    }

    #[test]
    fn bad_date_aborts_the_batch() {
        let input = merged(vec![
            merged_row("1", "Monthly", "2024/07/20", None),
            merged_row("2", "Monthly", "2024-13-40", None),
        ]);
        let err = transform(&input, &ctx(None), reference()).unwrap_err();
        match err {
            MigrateError::Anchor { customer, source } => {
                assert_eq!(customer, "2");
                assert!(matches!(source, AnchorError::DateLayout(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn columns_follow_prefixes() {
        let cols = MergedColumns::new("client.", "prov.", "Id");
        assert_eq!(cols.customer_id, "client.Id");
        assert_eq!(cols.new_id, "prov.new id");
        assert_eq!(
            cols.required(),
            ["client.BillingInterval", "client.NextBillingDateISO", "prov.new id"]
        );
    }
}
