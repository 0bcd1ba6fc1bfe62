//! Aggregator - totals over the effective view
//!
//! Re-run after every ledger mutation. There is no running total to keep in
//! sync: each call folds the view from scratch in O(n).

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::amount::Amount;
use crate::identity::RowRef;
use crate::reconcile::EffectiveRow;
use crate::snapshot::FieldSet;

/// How a row's derived value is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measure {
    /// Product of several fields, e.g. quantity × unit price
    Product { fields: Vec<String> },
    /// A single numeric field, e.g. an installment amount
    Field { field: String },
    /// Every active row counts as one
    Count,
}

impl Measure {
    pub fn product(left: &str, right: &str) -> Self {
        Measure::Product {
            fields: vec![left.to_string(), right.to_string()],
        }
    }

    pub fn field(name: &str) -> Self {
        Measure::Field {
            field: name.to_string(),
        }
    }

    /// Derived value of one row. Missing or non-numeric inputs count as zero,
    /// since rows are routinely read half-typed.
    pub fn line_value(&self, fields: &FieldSet) -> Amount {
        match self {
            Measure::Product { fields: names } => {
                if names.is_empty() {
                    return Amount::ZERO;
                }
                let mut value = Amount::from(1);
                for name in names {
                    let Some(factor) = fields.get(name).and_then(Amount::from_json) else {
                        return Amount::ZERO;
                    };
                    value = match value.checked_mul(factor) {
                        Some(v) => v,
                        None => {
                            tracing::warn!("Line value overflow multiplying field '{}'", name);
                            return Amount::ZERO;
                        }
                    };
                }
                value
            }
            Measure::Field { field } => fields
                .get(field)
                .and_then(Amount::from_json)
                .unwrap_or(Amount::ZERO),
            Measure::Count => Amount::from(1),
        }
    }
}

/// Derived value of one row in the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineValue {
    pub row: RowRef,
    pub value: Amount,
    pub is_removed: bool,
}

/// Totals plus per-row values, for editors that render line subtotals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: Amount,
    pub active_rows: u32,
    pub removed_rows: u32,
    pub lines: Vec<LineValue>,
}

/// Sum of derived values over rows not marked for deletion.
pub fn total(view: &[EffectiveRow], measure: &Measure) -> Amount {
    view.iter()
        .filter(|row| !row.is_removed)
        .map(|row| measure.line_value(&row.fields))
        .fold(Amount::ZERO, accumulate)
}

/// Total, row counts and every row's derived value (removed rows included,
/// flagged, so the editor can still show what they were worth).
pub fn summarize(view: &[EffectiveRow], measure: &Measure) -> Summary {
    let mut summary = Summary {
        total: Amount::ZERO,
        active_rows: 0,
        removed_rows: 0,
        lines: Vec::with_capacity(view.len()),
    };

    for row in view {
        let value = measure.line_value(&row.fields);
        if row.is_removed {
            summary.removed_rows += 1;
        } else {
            summary.active_rows += 1;
            summary.total = accumulate(summary.total, value);
        }
        summary.lines.push(LineValue {
            row: row.row.clone(),
            value,
            is_removed: row.is_removed,
        });
    }

    summary
}

fn accumulate(total: Amount, value: Amount) -> Amount {
    match total.checked_add(value) {
        Some(sum) => sum,
        None => {
            tracing::warn!("Total overflow adding {}; value skipped", value);
            total
        }
    }
}
