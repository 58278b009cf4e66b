//! # rusket-mf
//!
//! Latent-factor collaborative filtering trained by full-batch gradient
//! descent. A dense ratings matrix `Y` and an observation mask `R` (one row
//! per user) are factorized into item vectors `w_i`, user vectors `x_j` and
//! item biases `b_i` so that `x_j · w_i + b_i ≈ Y_ji` wherever `R_ji = 1`.
//!
//! ```no_run
//! use rusket_mf::{Config, FactorizationModel, FileBackend, RatingData};
//!
//! let config = Config::default();
//! let data = RatingData::load(&config.data)?;
//! let backend = FileBackend::new(&config.storage.dir);
//! let mut model = FactorizationModel::new(data, config.train, Box::new(backend))?;
//! let report = model.train()?;
//! println!("{}\n{}", report.elapsed_hms(), report.final_cost);
//! # Ok::<(), rusket_mf::MfError>(())
//! ```
//!
//! ## Modules
//!
//! - [`vector`]: dense `f32` vectors and their text form
//! - [`dataset`]: reading `Y` / `R` input files
//! - [`store`]: parameter ownership and persistence backends
//! - [`model`]: cost, gradients and the training loop
//! - [`config`]: serde/TOML configuration with documented defaults
//! - [`timing`]: `H:MM:SS` wall-clock reporting
//! - [`error`]: error type and result alias

pub mod config;
pub mod dataset;
pub mod error;
pub mod model;
pub mod store;
pub mod timing;
pub mod vector;

#[cfg(feature = "python")]
mod python;

pub use config::{Config, DataConfig, Init, StorageConfig, TrainConfig};
pub use dataset::{load_vectors, read_vectors, RatingData};
pub use error::{MfError, Result};
pub use model::{FactorizationModel, Gradients, StopReason, TrainReport};
pub use store::{FileBackend, MemoryBackend, ParamBackend, ParameterStore, Parameters, Slot};
pub use timing::{format_hms, Stopwatch};
pub use vector::FixedVector;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn _rusket_mf(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(python::mf_fit, m)?)?;
    Ok(())
}
