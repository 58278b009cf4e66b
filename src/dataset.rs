//! Ratings (`Y`) and observation mask (`R`) input.
//!
//! Input files hold whitespace-separated floats with no header. When a record
//! width is configured, values are accumulated across lines until exactly
//! `width` of them have been read and are then flushed as one vector, so a
//! single record may span several physical lines. Without a width every
//! non-blank line is one record.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::config::DataConfig;
use crate::error::{MfError, Result};
use crate::vector::{parse_f32, FixedVector};

/// Read records from `reader`. `path` is only used in error messages.
pub fn read_vectors<R: BufRead>(
    reader: R,
    width: Option<usize>,
    path: &Path,
) -> Result<Vec<FixedVector>> {
    if width == Some(0) {
        return Err(MfError::InvalidConfig("record width must be > 0".into()));
    }

    let mut out = Vec::new();
    let mut pending: Vec<f32> = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| MfError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }

        match width {
            None => out.push(FixedVector::parse_line(&line, path, line_no)?),
            Some(w) => {
                for tok in line.split_whitespace() {
                    if pending.len() == w {
                        return Err(MfError::RecordOverflow {
                            path: path.to_path_buf(),
                            line: line_no,
                            width: w,
                        });
                    }
                    pending.push(parse_f32(tok, path, line_no)?);
                }
                if pending.len() == w {
                    out.push(FixedVector::from(std::mem::take(&mut pending)));
                }
            }
        }
    }

    if let Some(w) = width {
        if !pending.is_empty() {
            return Err(MfError::TruncatedRecord {
                path: path.to_path_buf(),
                filled: pending.len(),
                width: w,
            });
        }
    }

    Ok(out)
}

/// Open `path` and read its records. A missing file is an I/O error.
pub fn load_vectors(path: &Path, width: Option<usize>) -> Result<Vec<FixedVector>> {
    let file = File::open(path).map_err(|e| MfError::io(path, e))?;
    let rows = read_vectors(BufReader::new(file), width, path)?;
    debug!(path = %path.display(), records = rows.len(), "loaded vectors");
    Ok(rows)
}

/// Validated ratings matrix and mask, one row per user.
#[derive(Debug, Clone)]
pub struct RatingData {
    y: Vec<FixedVector>,
    r: Vec<FixedVector>,
}

impl RatingData {
    /// Check that `y` and `r` are non-empty, rectangular, identically shaped,
    /// and that every mask entry is 0 or 1.
    pub fn new(y: Vec<FixedVector>, r: Vec<FixedVector>) -> Result<Self> {
        if y.is_empty() {
            return Err(MfError::EmptyInput("ratings matrix has no users".into()));
        }
        let n_items = y[0].len();
        if n_items == 0 {
            return Err(MfError::EmptyInput("ratings matrix has no items".into()));
        }
        if r.len() != y.len() {
            return Err(MfError::shape(y.len(), r.len()));
        }
        for (yj, rj) in y.iter().zip(&r) {
            if yj.len() != n_items {
                return Err(MfError::shape(n_items, yj.len()));
            }
            if rj.len() != n_items {
                return Err(MfError::shape(n_items, rj.len()));
            }
        }
        for (user, rj) in r.iter().enumerate() {
            if let Some((item, &value)) = rj
                .as_slice()
                .iter()
                .enumerate()
                .find(|(_, &v)| v != 0.0 && v != 1.0)
            {
                return Err(MfError::InvalidMask { user, item, value });
            }
        }
        Ok(Self { y, r })
    }

    /// Build from nested rows, mostly for tests and bindings.
    pub fn from_rows(y: Vec<Vec<f32>>, r: Vec<Vec<f32>>) -> Result<Self> {
        Self::new(
            y.into_iter().map(FixedVector::from).collect(),
            r.into_iter().map(FixedVector::from).collect(),
        )
    }

    /// Load `Y` and `R` from the files named in `config`.
    pub fn load(config: &DataConfig) -> Result<Self> {
        let y = load_vectors(&config.ratings, config.width)?;
        let r = load_vectors(&config.mask, config.width)?;
        let data = Self::new(y, r)?;
        info!(
            users = data.n_users(),
            items = data.n_items(),
            observed = data.observed(),
            "loaded rating data"
        );
        Ok(data)
    }

    pub fn n_users(&self) -> usize {
        self.y.len()
    }

    pub fn n_items(&self) -> usize {
        self.y[0].len()
    }

    /// Number of observed (user, item) pairs.
    pub fn observed(&self) -> usize {
        self.r
            .iter()
            .map(|rj| rj.as_slice().iter().filter(|&&v| v == 1.0).count())
            .sum()
    }

    pub fn ratings(&self) -> &[FixedVector] {
        &self.y
    }

    pub fn mask(&self) -> &[FixedVector] {
        &self.r
    }
}
