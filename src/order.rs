//! Run-sequence construction.
//!
//! The sequence is either the catalog in `(major, minor)` order, or the
//! historical order file (fastest first) with the previous run's real
//! failures in front.

use crate::catalog::{TestCatalog, TestId};
use std::collections::HashSet;
use std::path::Path;

/// Inputs to [`build_order`] beyond the catalog.
#[derive(Debug, Clone, Default)]
pub struct OrderInputs<'a> {
    pub order_file: Option<&'a Path>,
    pub last_fails: &'a [TestId],
    pub exclude_fails: bool,
    /// Ignore any existing order file so it gets regenerated
    pub generate_order_file: bool,
    pub begin_from: Option<TestId>,
}

/// The computed sequence and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOrder {
    pub ids: Vec<TestId>,
    pub uses_external_order: bool,
}

/// Read an order or fails file: one id per line, taken from the leading
/// whitespace-delimited token. Lines without a `test<M>.<N>` token are
/// skipped; trailing columns are ignored.
pub fn parse_id_list(content: &str) -> Vec<TestId> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(TestId::find_in)
        .collect()
}

/// Read an id list from disk; `None` if the file is missing or unreadable.
pub fn read_id_list(path: &Path) -> Option<Vec<TestId>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(parse_id_list(&content)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "id list not readable");
            None
        }
    }
}

/// Concatenate lists keeping the first occurrence of every id.
pub fn dedup_concat(lists: &[&[TestId]]) -> Vec<TestId> {
    let mut seen = HashSet::new();
    lists
        .iter()
        .flat_map(|list| list.iter().copied())
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Suffix of `ids` starting at `begin`.
///
/// The start is the literal position of `begin` when it occurs; otherwise
/// the first position holding an id `>= begin`. Empty if neither exists.
pub fn begin_from(ids: Vec<TestId>, begin: TestId) -> Vec<TestId> {
    let start = ids
        .iter()
        .position(|id| *id == begin)
        .or_else(|| ids.iter().position(|id| *id >= begin));
    match start {
        Some(idx) => ids[idx..].to_vec(),
        None => Vec::new(),
    }
}

/// Build the run sequence.
pub fn build_order(catalog: &TestCatalog, inputs: &OrderInputs<'_>) -> RunOrder {
    let external = if inputs.generate_order_file {
        None
    } else {
        inputs.order_file.and_then(read_id_list)
    };

    let order = match external {
        Some(file_ids) => {
            let ids = if inputs.exclude_fails {
                dedup_concat(&[&file_ids])
            } else {
                dedup_concat(&[inputs.last_fails, &file_ids])
            };
            RunOrder {
                ids,
                uses_external_order: true,
            }
        }
        None => RunOrder {
            ids: catalog.ids(),
            uses_external_order: false,
        },
    };

    match inputs.begin_from {
        Some(begin) => RunOrder {
            ids: begin_from(order.ids, begin),
            ..order
        },
        None => order,
    }
}
