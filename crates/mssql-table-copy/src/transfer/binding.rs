//! Per-table decimal binding.
//!
//! Decimal parameters are sent with the scale of the value, so a page mixing
//! `1.5` and `2.25` would bind the same column with different sizes. Every
//! decimal value is rescaled to its column's declared scale before insert.

use rust_decimal::Decimal;

use crate::core::{Row, SqlValue};
use crate::schema::TableDescriptor;

/// Declared (precision, scale) per column, index-aligned with the column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalBinding {
    columns: Vec<Option<(u8, u8)>>,
}

impl DecimalBinding {
    pub fn for_table(table: &TableDescriptor) -> Self {
        Self {
            columns: table.columns.iter().map(|c| c.exact_numeric()).collect(),
        }
    }

    /// True when the table has no exact-numeric columns.
    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(Option::is_none)
    }

    /// Rescale decimal cells of one row in place.
    pub fn apply(&self, row: &mut Row) {
        for (value, spec) in row.iter_mut().zip(&self.columns) {
            let Some((_, scale)) = spec else { continue };
            let scale = u32::from(*scale).min(28);
            match value {
                SqlValue::Decimal(d) => {
                    let mut rounded = d.round_dp(scale);
                    rounded.rescale(scale);
                    *d = rounded;
                }
                SqlValue::F64(f) => {
                    if let Ok(mut d) = Decimal::try_from(*f) {
                        d = d.round_dp(scale);
                        d.rescale(scale);
                        *value = SqlValue::Decimal(d);
                    }
                }
                _ => {}
            }
        }
    }

    pub fn apply_all(&self, rows: &mut [Row]) {
        if self.is_empty() {
            return;
        }
        for row in rows {
            self.apply(row);
        }
    }
}
