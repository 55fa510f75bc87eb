// src/table/join.rs
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use super::{push_header, Row, Table};
use crate::error::{MigrateError, Result};

/// What to do when the right-hand table repeats a join key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateKeys {
    /// The row seen last replaces earlier rows with the same key.
    #[default]
    LastWins,
    /// Abort the join.
    Reject,
}

/// Key columns and prefixes for [`join`].
#[derive(Debug, Clone, Copy)]
pub struct JoinSpec<'a> {
    pub left_prefix: &'a str,
    pub right_prefix: &'a str,
    pub left_key: &'a str,
    pub right_key: &'a str,
    pub duplicates: DuplicateKeys,
}

/// Inner join of `left` against `right` on exact string equality of the key columns.
///
/// Output rows follow `left` order and hold every left column prefixed with
/// `left_prefix` plus every right column prefixed with `right_prefix`. Left
/// rows with no matching right row are dropped.
#[instrument(level = "info", skip_all, fields(left_key = spec.left_key, right_key = spec.right_key))]
pub fn join(left: &Table, right: &Table, spec: &JoinSpec<'_>) -> Result<Table> {
    let mut headers = Vec::with_capacity(left.headers().len() + right.headers().len());
    for h in left.headers() {
        push_header(&mut headers, format!("{}{}", spec.left_prefix, h));
    }
    for h in right.headers() {
        push_header(&mut headers, format!("{}{}", spec.right_prefix, h));
    }

    let mut index: HashMap<&str, &Row> = HashMap::with_capacity(right.len());
    for row in right.rows() {
        let key = row.get(spec.right_key);
        if index.insert(key, row).is_some() {
            match spec.duplicates {
                DuplicateKeys::LastWins => debug!(key, "duplicate join key, keeping later row"),
                DuplicateKeys::Reject => {
                    return Err(MigrateError::DuplicateJoinKey {
                        column: spec.right_key.to_string(),
                        key: key.to_string(),
                    })
                }
            }
        }
    }

    let mut out = Table::new(headers);
    let mut dropped = 0usize;
    for row in left.rows() {
        let Some(matched) = index.get(row.get(spec.left_key)) else {
            dropped += 1;
            continue;
        };
        let merged: Row = row
            .iter()
            .map(|(k, v)| (format!("{}{}", spec.left_prefix, k), v))
            .chain(
                matched
                    .iter()
                    .map(|(k, v)| (format!("{}{}", spec.right_prefix, k), v)),
            )
            .collect();
        out.push(merged);
    }

    info!(matched = out.len(), dropped, "joined tables");
    Ok(out)
}
