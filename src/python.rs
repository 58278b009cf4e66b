use numpy::{PyArray1, PyArray2, PyArrayMethods, PyReadonlyArray2, PyUntypedArrayMethods};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::{Init, TrainConfig};
use crate::dataset::RatingData;
use crate::error::MfError;
use crate::model::FactorizationModel;
use crate::store::MemoryBackend;
use crate::vector::FixedVector;

fn to_py(e: MfError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn split_rows(flat: &[f32], n_items: usize) -> Vec<FixedVector> {
    flat.chunks(n_items)
        .map(|c| FixedVector::from(c.to_vec()))
        .collect()
}

fn flatten(rows: &[FixedVector]) -> Vec<f32> {
    rows.iter()
        .flat_map(|v| v.as_slice().iter().copied())
        .collect()
}

#[pyfunction]
#[pyo3(signature = (y, r, factors=10, iterations=100, regularization=1.0, learning_rate=6e-4, tolerance=1e-4, init_scale=None, seed=42, verbose=false))]
pub fn mf_fit<'py>(
    py: Python<'py>,
    y: PyReadonlyArray2<f32>,
    r: PyReadonlyArray2<f32>,
    factors: usize,
    iterations: usize,
    regularization: f32,
    learning_rate: f32,
    tolerance: f64,
    init_scale: Option<f32>,
    seed: u64,
    verbose: bool,
) -> PyResult<(
    Py<PyArray2<f32>>,
    Py<PyArray2<f32>>,
    Py<PyArray1<f32>>,
    f64,
)> {
    if y.shape() != r.shape() {
        return Err(PyValueError::new_err(format!(
            "y has shape {:?} but r has shape {:?}",
            y.shape(),
            r.shape()
        )));
    }
    let (n_users, n_items) = (y.shape()[0], y.shape()[1]);
    if n_users == 0 || n_items == 0 {
        return Err(PyValueError::new_err("y must be non-empty"));
    }
    let yv = y.as_slice()?;
    let rv = r.as_slice()?;
    let data = RatingData::new(split_rows(yv, n_items), split_rows(rv, n_items)).map_err(to_py)?;

    let config = TrainConfig::default()
        .with_features(factors)
        .with_max_iterations(iterations)
        .with_lambda(regularization)
        .with_learning_rate(learning_rate)
        .with_tolerance(tolerance)
        .with_resume(false)
        .with_init(Init::from_scale(init_scale, seed))
        .with_verbose(verbose);

    let (w, x, b, cost) = py
        .detach(|| -> crate::Result<_> {
            let mut model = FactorizationModel::new(data, config, Box::new(MemoryBackend::new()))?;
            let report = model.train()?;
            let p = model.params();
            Ok((
                flatten(&p.w),
                flatten(&p.x),
                p.b.as_slice().to_vec(),
                report.final_cost,
            ))
        })
        .map_err(to_py)?;

    let wa = PyArray1::from_vec(py, w);
    let xa = PyArray1::from_vec(py, x);

    Ok((
        wa.reshape([n_items, factors])?.into(),
        xa.reshape([n_users, factors])?.into(),
        PyArray1::from_vec(py, b).into(),
        cost,
    ))
}
