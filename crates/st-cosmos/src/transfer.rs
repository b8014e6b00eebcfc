// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Boundary to the transfer-function solver.
//!
//! A provider answers one batched request: sample wavenumbers, sample times
//! and a named source, returning a `[k, time, channel]` table. The realisation
//! engine only reads channel 0. Callers should batch every time step of a run
//! into a single request because solvers are expensive per call.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Temperature monopole source, the default evolution channel.
pub const MONOPOLE: &str = "monopole";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("unknown transfer source `{0}`")]
    UnknownSource(String),
    #[error("transfer table shape mismatch: expected {expected:?}, got {actual:?}")]
    TableShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("transfer request needs at least one wavenumber and one time")]
    EmptyRequest,
    #[error("transfer value at flat index {index} is not finite")]
    NonFinite { index: usize },
    #[error("transfer cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("transfer cache payload is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transfer provider failed: {0}")]
    Provider(String),
}

/// Transfer values indexed `[wavenumber, time, channel]`.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferTable {
    values: Array3<f64>,
}

impl TransferTable {
    pub fn new(values: Array3<f64>) -> Self {
        Self { values }
    }

    pub fn from_shape_vec(
        shape: (usize, usize, usize),
        values: Vec<f64>,
    ) -> Result<Self, TransferError> {
        let actual = values.len();
        let values = Array3::from_shape_vec(shape, values).map_err(|_| {
            TransferError::TableShape {
                expected: vec![shape.0, shape.1, shape.2],
                actual: vec![actual],
            }
        })?;
        Ok(Self { values })
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.values.dim()
    }

    /// Checks the table answers a request of `n_k` wavenumbers by `n_t` times
    /// with at least one channel and only finite values.
    pub fn ensure_shape(&self, n_k: usize, n_t: usize) -> Result<(), TransferError> {
        let (k, t, c) = self.values.dim();
        if k != n_k || t != n_t || c == 0 {
            return Err(TransferError::TableShape {
                expected: vec![n_k, n_t, 1],
                actual: vec![k, t, c],
            });
        }
        if let Some(index) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(TransferError::NonFinite { index });
        }
        Ok(())
    }

    /// Transfer values across wavenumbers for one time and channel.
    pub fn slice(&self, time_index: usize, channel: usize) -> Result<Vec<f64>, TransferError> {
        let (k, t, c) = self.values.dim();
        if time_index >= t || channel >= c {
            return Err(TransferError::TableShape {
                expected: vec![k, time_index + 1, channel + 1],
                actual: vec![k, t, c],
            });
        }
        Ok((0..k)
            .map(|i| self.values[[i, time_index, channel]])
            .collect())
    }
}

/// Anything that can evaluate transfer functions for a batch of wavenumbers
/// and times.
pub trait TransferProvider {
    fn transfer_table(
        &self,
        wavenumbers: &[f64],
        times: &[f64],
        source: &str,
    ) -> Result<TransferTable, TransferError>;
}

impl<P: TransferProvider + ?Sized> TransferProvider for &P {
    fn transfer_table(
        &self,
        wavenumbers: &[f64],
        times: &[f64],
        source: &str,
    ) -> Result<TransferTable, TransferError> {
        (**self).transfer_table(wavenumbers, times, source)
    }
}

impl<P: TransferProvider + ?Sized> TransferProvider for Box<P> {
    fn transfer_table(
        &self,
        wavenumbers: &[f64],
        times: &[f64],
        source: &str,
    ) -> Result<TransferTable, TransferError> {
        (**self).transfer_table(wavenumbers, times, source)
    }
}

fn ensure_request(wavenumbers: &[f64], times: &[f64]) -> Result<(), TransferError> {
    if wavenumbers.is_empty() || times.is_empty() {
        return Err(TransferError::EmptyRequest);
    }
    Ok(())
}

/// Single-source provider backed by a closure `T(k, time)`.
#[derive(Clone, Debug)]
pub struct FnTransfer<F> {
    source: String,
    f: F,
}

impl<F> FnTransfer<F>
where
    F: Fn(f64, f64) -> f64,
{
    pub fn new(source: impl Into<String>, f: F) -> Self {
        Self {
            source: source.into(),
            f,
        }
    }
}

impl<F> TransferProvider for FnTransfer<F>
where
    F: Fn(f64, f64) -> f64,
{
    fn transfer_table(
        &self,
        wavenumbers: &[f64],
        times: &[f64],
        source: &str,
    ) -> Result<TransferTable, TransferError> {
        ensure_request(wavenumbers, times)?;
        if source != self.source {
            return Err(TransferError::UnknownSource(source.to_string()));
        }
        let values = Array3::from_shape_fn((wavenumbers.len(), times.len(), 1), |(i, j, _)| {
            (self.f)(wavenumbers[i], times[j])
        });
        Ok(TransferTable::new(values))
    }
}

/// Pre-computed transfer functions on a `(k, time)` lattice per source.
///
/// Lookups interpolate bilinearly in `(ln k, time)` and clamp to the edges of
/// the tabulated range.
#[derive(Clone, Debug)]
pub struct TabulatedTransfer {
    wavenumbers: Vec<f64>,
    times: Vec<f64>,
    sources: BTreeMap<String, Array2<f64>>,
}

impl TabulatedTransfer {
    /// `wavenumbers` must be positive and increasing, `times` increasing.
    pub fn new(wavenumbers: Vec<f64>, times: Vec<f64>) -> Result<Self, TransferError> {
        ensure_request(&wavenumbers, &times)?;
        let bad_k = wavenumbers
            .iter()
            .position(|k| !(k.is_finite() && *k > 0.0))
            .or_else(|| wavenumbers.windows(2).position(|w| w[1] <= w[0]));
        let bad_t = times
            .iter()
            .position(|t| !t.is_finite())
            .or_else(|| times.windows(2).position(|w| w[1] <= w[0]));
        if bad_k.is_some() || bad_t.is_some() {
            return Err(TransferError::Provider(
                "tabulated lattice must be finite and strictly increasing".into(),
            ));
        }
        Ok(Self {
            wavenumbers,
            times,
            sources: BTreeMap::new(),
        })
    }

    /// Registers `values[k, time]` under `source`.
    pub fn with_source(
        mut self,
        source: impl Into<String>,
        values: Array2<f64>,
    ) -> Result<Self, TransferError> {
        let expected = (self.wavenumbers.len(), self.times.len());
        if values.dim() != expected {
            let (k, t) = values.dim();
            return Err(TransferError::TableShape {
                expected: vec![expected.0, expected.1],
                actual: vec![k, t],
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(TransferError::NonFinite { index });
        }
        self.sources.insert(source.into(), values);
        Ok(self)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    fn lookup(&self, table: &Array2<f64>, k: f64, time: f64) -> f64 {
        let (i0, i1, u) = bracket(&self.wavenumbers, k, |v| v.ln());
        let (j0, j1, v) = bracket(&self.times, time, |t| t);
        let low = table[[i0, j0]] * (1.0 - v) + table[[i0, j1]] * v;
        let high = table[[i1, j0]] * (1.0 - v) + table[[i1, j1]] * v;
        low * (1.0 - u) + high * u
    }
}

/// Locates `x` on `axis`, returning the neighbouring indices and the linear
/// weight of the upper one after mapping coordinates through `map`.
fn bracket(axis: &[f64], x: f64, map: impl Fn(f64) -> f64) -> (usize, usize, f64) {
    let last = axis.len() - 1;
    if last == 0 || x <= axis[0] {
        return (0, 0, 0.0);
    }
    if x >= axis[last] {
        return (last, last, 0.0);
    }
    let upper = axis.partition_point(|&a| a <= x);
    let lower = upper - 1;
    let (a, b) = (map(axis[lower]), map(axis[upper]));
    (lower, upper, (map(x) - a) / (b - a))
}

impl TransferProvider for TabulatedTransfer {
    fn transfer_table(
        &self,
        wavenumbers: &[f64],
        times: &[f64],
        source: &str,
    ) -> Result<TransferTable, TransferError> {
        ensure_request(wavenumbers, times)?;
        let table = self
            .sources
            .get(source)
            .ok_or_else(|| TransferError::UnknownSource(source.to_string()))?;
        if let Some(index) = wavenumbers.iter().position(|k| !(k.is_finite() && *k > 0.0)) {
            return Err(TransferError::NonFinite { index });
        }
        let values = Array3::from_shape_fn((wavenumbers.len(), times.len(), 1), |(i, j, _)| {
            self.lookup(table, wavenumbers[i], times[j])
        });
        Ok(TransferTable::new(values))
    }
}

#[derive(Serialize, Deserialize)]
struct CachedTable {
    source: String,
    wavenumbers: Vec<f64>,
    times: Vec<f64>,
    channels: usize,
    values: Vec<f64>,
}

/// Persists tables produced by `inner` as JSON files under `dir`, keyed by
/// the exact request. A stored table is only reused when its wavenumbers and
/// times match the request bit for bit.
#[derive(Clone, Debug)]
pub struct CachedTransfer<P> {
    inner: P,
    dir: PathBuf,
}

impl<P: TransferProvider> CachedTransfer<P> {
    pub fn new(inner: P, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            dir: dir.into(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that would hold the table for this request. The name is derived
    /// from the request hash only, so any source string stays inside `dir`.
    pub fn entry_path(&self, wavenumbers: &[f64], times: &[f64], source: &str) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        for k in wavenumbers {
            k.to_bits().hash(&mut hasher);
        }
        0xffu8.hash(&mut hasher);
        for t in times {
            t.to_bits().hash(&mut hasher);
        }
        self.dir.join(format!("transfer-{:016x}.json", hasher.finish()))
    }

    /// Stored table for the request, if one is readable and matches it.
    /// Unreadable or foreign entries are treated as misses and overwritten by
    /// the next store.
    fn load(
        path: &Path,
        wavenumbers: &[f64],
        times: &[f64],
        source: &str,
    ) -> Option<TransferTable> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                debug!(
                    target: "st_cosmos::transfer",
                    path = %path.display(),
                    %err,
                    "transfer cache unreadable"
                );
                return None;
            }
        };
        let cached: CachedTable = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(err) => {
                debug!(
                    target: "st_cosmos::transfer",
                    path = %path.display(),
                    %err,
                    "discarding corrupt transfer cache entry"
                );
                return None;
            }
        };
        let same = |a: &[f64], b: &[f64]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
        };
        if cached.source != source
            || !same(&cached.wavenumbers, wavenumbers)
            || !same(&cached.times, times)
        {
            return None;
        }
        let table = TransferTable::from_shape_vec(
            (wavenumbers.len(), times.len(), cached.channels),
            cached.values,
        )
        .and_then(|table| {
            table.ensure_shape(wavenumbers.len(), times.len())?;
            Ok(table)
        });
        match table {
            Ok(table) => Some(table),
            Err(err) => {
                debug!(
                    target: "st_cosmos::transfer",
                    path = %path.display(),
                    %err,
                    "discarding misshapen transfer cache entry"
                );
                None
            }
        }
    }

    /// Writes next to the entry and renames into place, so readers never see
    /// a partial file.
    fn store(
        path: &Path,
        table: &TransferTable,
        wavenumbers: &[f64],
        times: &[f64],
        source: &str,
    ) -> Result<(), TransferError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = CachedTable {
            source: source.to_string(),
            wavenumbers: wavenumbers.to_vec(),
            times: times.to_vec(),
            channels: table.dim().2,
            values: table.values().iter().copied().collect(),
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string(&payload)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl<P: TransferProvider> TransferProvider for CachedTransfer<P> {
    fn transfer_table(
        &self,
        wavenumbers: &[f64],
        times: &[f64],
        source: &str,
    ) -> Result<TransferTable, TransferError> {
        ensure_request(wavenumbers, times)?;
        let path = self.entry_path(wavenumbers, times, source);
        if let Some(table) = Self::load(&path, wavenumbers, times, source) {
            debug!(target: "st_cosmos::transfer", path = %path.display(), "transfer cache hit");
            return Ok(table);
        }
        let table = self.inner.transfer_table(wavenumbers, times, source)?;
        table.ensure_shape(wavenumbers.len(), times.len())?;
        Self::store(&path, &table, wavenumbers, times, source)?;
        debug!(target: "st_cosmos::transfer", path = %path.display(), "transfer cache stored");
        Ok(table)
    }
}
