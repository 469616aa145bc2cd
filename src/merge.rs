use crate::model::{CanonicalRow, Pollutant};
use tracing::debug;

/// Whether `row` survives the merge: at least one finite pollutant value.
pub fn has_usable_values(row: &CanonicalRow) -> bool {
    Pollutant::ALL
        .into_iter()
        .any(|p| row.get(p).is_some_and(f64::is_finite))
}

/// Concatenate per-file frames in file order, blank out non-finite values,
/// and drop rows with no pollutant data at all.
pub fn merge(rows_per_file: impl IntoIterator<Item = Vec<CanonicalRow>>) -> Vec<CanonicalRow> {
    let mut merged = Vec::new();
    let mut dropped = 0usize;

    for rows in rows_per_file {
        for mut row in rows {
            for pollutant in Pollutant::ALL {
                if row.get(pollutant).is_some_and(|v| !v.is_finite()) {
                    row.set(pollutant, None);
                }
            }

            if row.has_any_pollutant() {
                merged.push(row);
            } else {
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        debug!("Dropped {} rows with no pollutant values", dropped);
    }
    merged
}
