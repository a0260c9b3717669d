//! Standard Scaler
//!
//! Per-column standardization to zero mean and unit variance (population std).
//! The scaler is fitted once and the same transform is reused for every row
//! scored afterwards. Constant columns keep a scale of 1.

use serde::{Deserialize, Serialize};

use crate::strategy::error::ModelError;

const MODEL: &str = "standard scaler";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    /// Rows seen during fitting
    pub fitted_rows: usize,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, ModelError> {
        let first = rows.first().ok_or(ModelError::InsufficientRows {
            model: MODEL,
            required: 1,
            actual: 0,
        })?;
        let width = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            check_width(row, width)?;
            for (m, x) in means.iter_mut().zip(row) {
                *m += x;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut vars = vec![0.0; width];
        for row in rows {
            for ((v, x), m) in vars.iter_mut().zip(row).zip(&means) {
                *v += (x - m) * (x - m);
            }
        }
        let scales = vars
            .into_iter()
            .map(|v| {
                let s = (v / n).sqrt();
                if s.is_finite() && s > f64::EPSILON {
                    s
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self {
            means,
            scales,
            fitted_rows: rows.len(),
        })
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_width(row, self.width())?;
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}

fn check_width(row: &[f64], expected: usize) -> Result<(), ModelError> {
    if row.len() != expected {
        return Err(ModelError::DimensionMismatch {
            model: MODEL,
            expected,
            actual: row.len(),
        });
    }
    Ok(())
}
