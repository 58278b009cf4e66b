//! Parameter ownership and persistence.
//!
//! `W` and `X` are written one vector per line in the [`FixedVector`] text
//! form; `b` is written one float per line. Loading reads exactly that
//! format back, so `load(save(p)) == p` up to float formatting.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::config::Init;
use crate::error::{MfError, Result};
use crate::vector::{parse_f32, FixedVector};

// ── Parameters ─────────────────────────────────────────────────────────────

/// The three learned parameter collections.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Item feature vectors `w_i`.
    pub w: Vec<FixedVector>,
    /// User feature vectors `x_j`; coordinate 0 is pinned to 1.
    pub x: Vec<FixedVector>,
    /// Item biases `b_i`.
    pub b: FixedVector,
}

impl Parameters {
    /// Zero-initialised parameters with every `x_j[0] = 1`.
    pub fn zeros(n_items: usize, n_users: usize, k: usize) -> Self {
        Self::init(n_items, n_users, k, Init::Zeros)
    }

    pub fn init(n_items: usize, n_users: usize, k: usize, init: Init) -> Self {
        let mut w = vec![FixedVector::zeros(k); n_items];
        let mut x = vec![FixedVector::zeros(k); n_users];
        if let Init::Uniform { scale, seed } = init {
            let mut rng = XorShift64::new(seed);
            for v in w.iter_mut().chain(x.iter_mut()) {
                for e in v.as_mut_slice() {
                    *e = (rng.next_float() * 2.0 - 1.0) * scale;
                }
            }
        }
        if k > 0 {
            for xj in &mut x {
                xj.set(0, 1.0);
            }
        }
        Self {
            w,
            x,
            b: FixedVector::zeros(n_items),
        }
    }

    pub fn n_items(&self) -> usize {
        self.w.len()
    }

    pub fn n_users(&self) -> usize {
        self.x.len()
    }

    /// Feature count, taken from the first item vector.
    pub fn features(&self) -> usize {
        self.w.first().map_or(0, FixedVector::len)
    }

    /// Verify that every collection has the given dimensions.
    pub fn check_shape(&self, n_items: usize, n_users: usize, k: usize) -> Result<()> {
        if self.w.len() != n_items {
            return Err(MfError::shape(n_items, self.w.len()));
        }
        if self.b.len() != n_items {
            return Err(MfError::shape(n_items, self.b.len()));
        }
        if self.x.len() != n_users {
            return Err(MfError::shape(n_users, self.x.len()));
        }
        if let Some(v) = self.w.iter().chain(&self.x).find(|v| v.len() != k) {
            return Err(MfError::shape(k, v.len()));
        }
        Ok(())
    }
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0xbad5eed } else { seed },
        }
    }

    #[inline(always)]
    fn next(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    #[inline(always)]
    fn next_float(&mut self) -> f32 {
        let v = self.next() & 0xFFFFFF;
        v as f32 / 0xFFFFFF as f32
    }
}

// ── Text encoding ──────────────────────────────────────────────────────────

fn encode_rows(rows: &[FixedVector]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&row.to_string());
        out.push('\n');
    }
    out
}

fn encode_scalars(values: &FixedVector) -> String {
    let mut out = String::new();
    for v in values.as_slice() {
        out.push_str(&v.to_string());
        out.push('\n');
    }
    out
}

fn decode_rows(text: &str, path: &Path) -> Result<Vec<FixedVector>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| FixedVector::parse_line(line, path, idx + 1))
        .collect()
}

fn decode_scalars(text: &str, path: &Path) -> Result<FixedVector> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| parse_f32(line.trim(), path, idx + 1))
        .collect::<Result<Vec<f32>>>()
        .map(FixedVector::from)
}

// ── Backends ───────────────────────────────────────────────────────────────

/// One persisted parameter collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    ItemFeatures,
    UserFeatures,
    ItemBias,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::ItemFeatures, Slot::UserFeatures, Slot::ItemBias];

    pub const fn file_name(self) -> &'static str {
        match self {
            Slot::ItemFeatures => "w.param",
            Slot::UserFeatures => "x.param",
            Slot::ItemBias => "b.param",
        }
    }

    const fn index(self) -> usize {
        match self {
            Slot::ItemFeatures => 0,
            Slot::UserFeatures => 1,
            Slot::ItemBias => 2,
        }
    }
}

/// Storage for the serialized parameter slots.
pub trait ParamBackend: Send {
    /// Contents of `slot`, or `None` if it has never been written.
    fn read(&self, slot: Slot) -> Result<Option<String>>;

    /// Replace the contents of `slot`.
    fn write(&mut self, slot: Slot, contents: &str) -> Result<()>;

    /// Delete `slot`; deleting an absent slot is not an error.
    fn remove(&mut self, slot: Slot) -> Result<()>;

    /// Path-like name of `slot`, used in logs and error messages.
    fn location(&self, slot: Slot) -> PathBuf;
}

/// Parameter files in a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ParamBackend for FileBackend {
    fn read(&self, slot: Slot) -> Result<Option<String>> {
        let path = self.location(slot);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MfError::io(path, e)),
        }
    }

    fn write(&mut self, slot: Slot, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| MfError::io(&self.dir, e))?;
        let path = self.location(slot);
        fs::write(&path, contents).map_err(|e| MfError::io(path, e))
    }

    fn remove(&mut self, slot: Slot) -> Result<()> {
        let path = self.location(slot);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MfError::io(path, e)),
        }
    }

    fn location(&self, slot: Slot) -> PathBuf {
        self.dir.join(slot.file_name())
    }
}

/// In-process storage. Clones share the same slots, so a caller can keep a
/// handle to inspect what a model persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    slots: Arc<Mutex<[Option<String>; 3]>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slots<T>(&self, f: impl FnOnce(&mut [Option<String>; 3]) -> T) -> T {
        let mut guard = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl ParamBackend for MemoryBackend {
    fn read(&self, slot: Slot) -> Result<Option<String>> {
        Ok(self.with_slots(|s| s[slot.index()].clone()))
    }

    fn write(&mut self, slot: Slot, contents: &str) -> Result<()> {
        self.with_slots(|s| s[slot.index()] = Some(contents.to_string()));
        Ok(())
    }

    fn remove(&mut self, slot: Slot) -> Result<()> {
        self.with_slots(|s| s[slot.index()] = None);
        Ok(())
    }

    fn location(&self, slot: Slot) -> PathBuf {
        Path::new("<memory>").join(slot.file_name())
    }
}

// ── ParameterStore ─────────────────────────────────────────────────────────

/// Owns the live parameters and the backend they are persisted to.
pub struct ParameterStore {
    params: Parameters,
    backend: Box<dyn ParamBackend>,
}

impl std::fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStore")
            .field("params", &self.params)
            .field("location", &self.backend.location(Slot::ItemFeatures))
            .finish()
    }
}

impl ParameterStore {
    pub fn new(params: Parameters, backend: Box<dyn ParamBackend>) -> Self {
        Self { params, backend }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    pub fn into_params(self) -> Parameters {
        self.params
    }

    /// Decode whatever is persisted, without touching the live parameters.
    ///
    /// Returns `Ok(None)` when the item-feature slot is absent. Once that slot
    /// exists the other two are required.
    pub fn read(&self) -> Result<Option<Parameters>> {
        let Some(w_text) = self.backend.read(Slot::ItemFeatures)? else {
            return Ok(None);
        };
        let x_text = self.require(Slot::UserFeatures)?;
        let b_text = self.require(Slot::ItemBias)?;

        Ok(Some(Parameters {
            w: decode_rows(&w_text, &self.backend.location(Slot::ItemFeatures))?,
            x: decode_rows(&x_text, &self.backend.location(Slot::UserFeatures))?,
            b: decode_scalars(&b_text, &self.backend.location(Slot::ItemBias))?,
        }))
    }

    fn require(&self, slot: Slot) -> Result<String> {
        self.backend.read(slot)?.ok_or_else(|| {
            MfError::io(
                self.backend.location(slot),
                std::io::Error::new(ErrorKind::NotFound, "parameter slot missing"),
            )
        })
    }

    /// Replace the live parameters with the persisted ones.
    ///
    /// Returns `Ok(false)` and leaves the parameters untouched when nothing
    /// has been persisted. A persisted state whose dimensions differ from the
    /// live parameters is rejected with [`MfError::ShapeMismatch`].
    pub fn load(&mut self) -> Result<bool> {
        let Some(loaded) = self.read()? else {
            debug!(
                location = %self.backend.location(Slot::ItemFeatures).display(),
                "no persisted parameters"
            );
            return Ok(false);
        };
        loaded.check_shape(
            self.params.n_items(),
            self.params.n_users(),
            self.params.features(),
        )?;
        self.params = loaded;
        info!(
            location = %self.backend.location(Slot::ItemFeatures).display(),
            items = self.params.n_items(),
            users = self.params.n_users(),
            "resumed parameters"
        );
        Ok(true)
    }

    /// Persist the live parameters, overwriting prior content.
    pub fn save(&mut self) -> Result<()> {
        self.backend
            .write(Slot::ItemFeatures, &encode_rows(&self.params.w))?;
        self.backend
            .write(Slot::UserFeatures, &encode_rows(&self.params.x))?;
        self.backend
            .write(Slot::ItemBias, &encode_scalars(&self.params.b))?;
        info!(
            location = %self.backend.location(Slot::ItemFeatures).display(),
            "saved parameters"
        );
        Ok(())
    }

    /// Delete every persisted slot.
    pub fn reset(&mut self) -> Result<()> {
        for slot in Slot::ALL {
            self.backend.remove(slot)?;
        }
        info!(
            location = %self.backend.location(Slot::ItemFeatures).display(),
            "removed persisted parameters"
        );
        Ok(())
    }
}
