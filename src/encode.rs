use serde::{Deserialize, Serialize};

/// One-hot slot layout for a single categorical column, frozen at fit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSlots {
    pub attribute: String,
    /// Slot order = first-observed order over the training rows. Deterministic
    /// because the dataset order is deterministic.
    pub labels: Vec<String>,
}

/// Fitted categorical encoder. The output dimensionality and column-to-index
/// mapping are part of the persisted artifact so a process restart reproduces
/// exactly the same feature layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoder {
    pub columns: Vec<ColumnSlots>,
}

impl Encoder {
    /// Learn, per column, the set of canonical labels observed in training
    /// data. `attributes` gives the column names in dataset order; each row in
    /// `rows` holds one label per attribute, aligned.
    pub fn fit(attributes: &[&str], rows: &[Vec<String>]) -> Self {
        let columns = attributes
            .iter()
            .enumerate()
            .map(|(col, attr)| {
                let mut labels: Vec<String> = Vec::new();
                for row in rows {
                    let label = &row[col];
                    if !labels.contains(label) {
                        labels.push(label.clone());
                    }
                }
                ColumnSlots {
                    attribute: attr.to_string(),
                    labels,
                }
            })
            .collect();
        Self { columns }
    }

    /// Total width of an encoded feature vector.
    pub fn width(&self) -> usize {
        self.columns.iter().map(|c| c.labels.len()).sum()
    }

    /// True when the encoder carries no usable feature slots. Such an encoder
    /// must never be persisted or predicted from.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.width() == 0
    }

    /// Encode one row of canonical labels. A label never seen during fit gets
    /// all-zero slots for its column rather than an error: the normalizer's
    /// default bucket may simply not have appeared in training.
    pub fn transform_row(&self, labels: &[String]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.width());
        for (col, slots) in self.columns.iter().enumerate() {
            let hit = slots.labels.iter().position(|l| l == &labels[col]);
            for slot in 0..slots.labels.len() {
                out.push(if hit == Some(slot) { 1.0 } else { 0.0 });
            }
        }
        out
    }

    pub fn transform(&self, rows: &[Vec<String>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}
