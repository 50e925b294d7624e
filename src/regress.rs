use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PriceError;

/// Tiny ridge term added to the normal-equation diagonal. One-hot columns are
/// collinear with the intercept, so plain XᵀX is singular; this keeps the
/// system solvable without visibly moving the fit.
const RIDGE: f64 = 1e-6;

/// Fitted ordinary-least-squares linear regression. Data only; the fit and
/// predict logic are plain functions over this struct, so the persisted form
/// carries no behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Metrics {
    pub mse: f64,
    pub r2: f64,
}

impl LinearModel {
    /// Solve the normal equations for `y ≈ intercept + X·coefficients`.
    pub fn fit(x: &[Vec<f64>], y: &[f64]) -> Result<Self, PriceError> {
        if x.is_empty() || y.is_empty() {
            return Err(PriceError::DataEmpty("empty training split".into()));
        }
        let p = x[0].len();
        if p == 0 {
            return Err(PriceError::DataEmpty("empty feature set".into()));
        }

        // Augmented system over [intercept, coefficients].
        let n = p + 1;
        let mut a = vec![vec![0.0; n]; n];
        let mut b = vec![0.0; n];
        for (row, target) in x.iter().zip(y) {
            for i in 0..n {
                let xi = if i == 0 { 1.0 } else { row[i - 1] };
                b[i] += xi * target;
                for j in 0..n {
                    let xj = if j == 0 { 1.0 } else { row[j - 1] };
                    a[i][j] += xi * xj;
                }
            }
        }
        for (i, diag) in a.iter_mut().enumerate() {
            diag[i] += RIDGE;
        }

        let solution = solve(a, b);
        Ok(Self {
            intercept: solution[0],
            coefficients: solution[1..].to_vec(),
        })
    }

    /// Predict one encoded row. A price is never reported negative, regardless
    /// of what the linear surface computes for out-of-distribution inputs.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let raw: f64 = self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, v)| c * v)
                .sum::<f64>();
        raw.max(0.0)
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|r| self.predict_row(r)).collect()
    }

    /// Diagnostic fit quality on a held-out set. Logged, never a gate: a low
    /// R² does not block saving the model.
    pub fn evaluate(&self, x_test: &[Vec<f64>], y_test: &[f64]) -> Metrics {
        let y_pred = self.predict(x_test);
        let n = y_test.len().max(1) as f64;
        let mse = y_test
            .iter()
            .zip(&y_pred)
            .map(|(y, p)| (y - p).powi(2))
            .sum::<f64>()
            / n;
        let mean = y_test.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_test.iter().map(|y| (y - mean).powi(2)).sum();
        let ss_res: f64 = y_test
            .iter()
            .zip(&y_pred)
            .map(|(y, p)| (y - p).powi(2))
            .sum();
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
        info!("evaluation: mse={:.2} r2={:.4}", mse, r2);
        Metrics { mse, r2 }
    }
}

/// Gaussian elimination with partial pivoting. A pivot that vanishes despite
/// the ridge term zeroes the corresponding coefficient instead of blowing up.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);
        if a[col][col].abs() < 1e-12 {
            continue;
        }
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                let v = a[col][k];
                a[row][k] -= factor * v;
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut acc = b[col];
        for k in col + 1..n {
            acc -= a[col][k] * x[k];
        }
        x[col] = if a[col][col].abs() < 1e-12 {
            0.0
        } else {
            acc / a[col][col]
        };
    }
    x
}
