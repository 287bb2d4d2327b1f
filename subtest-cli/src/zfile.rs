//! Delimited Z-score table reader and writer.
//!
//! Reads tab/space-delimited files with a header row, picking the Z_d, Z_a
//! and optional weight columns by name. Missing values become NaN and are
//! dropped later when the observations are built.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};

use subtest_core::Observations;

/// Raw columns read from a Z-score table.
#[derive(Debug, Clone)]
pub struct ZTable {
    pub z: Vec<[f64; 2]>,
    pub weights: Option<Vec<f64>>,
}

impl ZTable {
    pub fn into_observations(self) -> Result<Observations> {
        Ok(Observations::new(self.z, self.weights)?)
    }
}

/// Parse a Z-score table.
pub fn parse_z_file(
    path: &Path,
    zd_col: &str,
    za_col: &str,
    weight_col: Option<&str>,
) -> Result<ZTable> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read Z-score file: {}", path.display()))?;
    parse_z_table(&contents, zd_col, za_col, weight_col)
}

fn parse_z_table(
    contents: &str,
    zd_col: &str,
    za_col: &str,
    weight_col: Option<&str>,
) -> Result<ZTable> {
    let mut lines = contents.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty Z-score file"))?;

    let delim = if header_line.contains('\t') { '\t' } else { ' ' };
    let headers: Vec<&str> = header_line
        .split(delim)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    let column = |name: &str| {
        headers
            .iter()
            .position(|&h| h == name)
            .ok_or_else(|| anyhow::anyhow!("Column '{}' not found in header", name))
    };
    let zd_idx = column(zd_col)?;
    let za_idx = column(za_col)?;
    let w_idx = weight_col.map(column).transpose()?;
    let needed = zd_idx.max(za_idx).max(w_idx.unwrap_or(0)) + 1;

    let mut z = Vec::new();
    let mut weights = w_idx.map(|_| Vec::new());
    for (line_num, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line
            .split(delim)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() || delim == '\t')
            .collect();
        if fields.len() < needed {
            bail!(
                "Line {} has too few fields (expected at least {})",
                line_num + 2,
                needed
            );
        }
        z.push([parse_value(fields[zd_idx]), parse_value(fields[za_idx])]);
        if let (Some(w), Some(i)) = (weights.as_mut(), w_idx) {
            w.push(parse_value(fields[i]));
        }
    }

    Ok(ZTable { z, weights })
}

/// Parse a string value to f64, treating NA/missing as NaN.
fn parse_value(s: &str) -> f64 {
    match s {
        "NA" | "na" | "Na" | "." | "" | "-" | "NaN" | "nan" => f64::NAN,
        _ => s.parse().unwrap_or(f64::NAN),
    }
}

/// Write observations as a tab-delimited table with an optional class column.
pub fn write_z_file(path: &Path, obs: &Observations, classes: Option<&[u8]>) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    match classes {
        Some(_) => writeln!(out, "Z_d\tZ_a\tweight\tclass")?,
        None => writeln!(out, "Z_d\tZ_a\tweight")?,
    }
    for (i, (z, w)) in obs.z().iter().zip(obs.weights()).enumerate() {
        match classes.and_then(|c| c.get(i)) {
            Some(c) => writeln!(out, "{}\t{}\t{}\t{}", z[0], z[1], w, c + 1)?,
            None => writeln!(out, "{}\t{}\t{}", z[0], z[1], w)?,
        }
    }
    out.flush()?;
    Ok(())
}
