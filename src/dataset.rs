use anyhow::Context;
use serde::{Deserialize, Serialize};

/// In-memory table parsed from an uploaded CSV byte stream. Immutable once
/// loaded; a new upload replaces the whole value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    numeric: Vec<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub label: String,
    pub total: f64,
}

fn parse_cell(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Percentile with linear interpolation between closest ranks.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

impl Dataset {
    /// Parse a UTF-8 CSV byte stream with a header row. Ragged rows and
    /// invalid UTF-8 are errors; the caller keeps any previously loaded
    /// dataset on failure.
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let text = std::str::from_utf8(bytes).context("upload is not valid UTF-8")?;
        let mut reader = csv::ReaderBuilder::new().from_reader(text.as_bytes());
        let headers: Vec<String> = reader
            .headers()
            .context("failed to read header row")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            anyhow::bail!("CSV has no header row");
        }

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record.context("failed to parse CSV record")?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        // A column is numeric when every non-empty cell parses as a finite
        // float and at least one such cell exists.
        let mut numeric = vec![false; headers.len()];
        for (i, flag) in numeric.iter_mut().enumerate() {
            let mut seen = false;
            let mut all = true;
            for row in &rows {
                let cell = row[i].trim();
                if cell.is_empty() {
                    continue;
                }
                if parse_cell(cell).is_some() {
                    seen = true;
                } else {
                    all = false;
                    break;
                }
            }
            *flag = seen && all;
        }

        Ok(Self { headers, rows, numeric })
    }

    pub fn columns(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn preview(&self, n: usize) -> &[Vec<String>] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        self.headers
            .iter()
            .zip(&self.numeric)
            .filter(|(_, is_num)| **is_num)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn numeric_values(&self, col: usize) -> Vec<f64> {
        self.rows.iter().filter_map(|row| parse_cell(&row[col])).collect()
    }

    /// Descriptive statistics per numeric column: count, mean, sample std,
    /// min, quartiles, max. Blank cells are skipped. No numeric columns
    /// yields an empty table.
    pub fn describe(&self) -> Vec<ColumnStats> {
        let mut stats = Vec::new();
        for (i, name) in self.headers.iter().enumerate() {
            if !self.numeric[i] {
                continue;
            }
            let mut values = self.numeric_values(i);
            if values.is_empty() {
                continue;
            }
            values.sort_by(|a, b| a.total_cmp(b));
            let count = values.len();
            let mean = values.iter().sum::<f64>() / count as f64;
            let std = if count > 1 {
                (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64)
                    .sqrt()
            } else {
                0.0
            };
            stats.push(ColumnStats {
                column: name.clone(),
                count,
                mean,
                std,
                min: values[0],
                q25: percentile(&values, 0.25),
                median: percentile(&values, 0.5),
                q75: percentile(&values, 0.75),
                max: values[count - 1],
            });
        }
        stats
    }

    /// Pearson correlation matrix over numeric columns, pairwise across rows
    /// where both cells hold numeric values. None with fewer than two
    /// numeric columns.
    pub fn correlation(&self) -> Option<CorrelationMatrix> {
        let indices: Vec<usize> =
            (0..self.headers.len()).filter(|i| self.numeric[*i]).collect();
        if indices.len() < 2 {
            return None;
        }
        let columns: Vec<String> =
            indices.iter().map(|i| self.headers[*i].clone()).collect();
        let n = indices.len();
        let mut values = vec![vec![0.0; n]; n];
        for a in 0..n {
            for b in 0..n {
                values[a][b] = if a == b {
                    1.0
                } else {
                    self.pearson(indices[a], indices[b])
                };
            }
        }
        Some(CorrelationMatrix { columns, values })
    }

    fn pearson(&self, x: usize, y: usize) -> f64 {
        let pairs: Vec<(f64, f64)> = self
            .rows
            .iter()
            .filter_map(|row| Some((parse_cell(&row[x])?, parse_cell(&row[y])?)))
            .collect();
        if pairs.len() < 2 {
            return 0.0;
        }
        let n = pairs.len() as f64;
        let mean_x = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
        let mean_y = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;
        let mut cov = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for (a, b) in &pairs {
            let dx = a - mean_x;
            let dy = b - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }
        let denom = (var_x * var_y).sqrt();
        if denom == 0.0 { 0.0 } else { cov / denom }
    }

    /// Sum of a numeric column grouped by a key column, in first-appearance
    /// order. None when either column is missing.
    pub fn category_totals(&self, key: &str, value: &str) -> Option<Vec<CategoryTotal>> {
        let ki = self.headers.iter().position(|h| h == key)?;
        let vi = self.headers.iter().position(|h| h == value)?;
        let mut totals: Vec<CategoryTotal> = Vec::new();
        for row in &self.rows {
            let Some(v) = parse_cell(&row[vi]) else { continue };
            let label = row[ki].trim();
            match totals.iter_mut().find(|t| t.label == label) {
                Some(entry) => entry.total += v,
                None => totals.push(CategoryTotal { label: label.to_string(), total: v }),
            }
        }
        Some(totals)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }
}
