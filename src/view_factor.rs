//! Persistent view-factor matrices and the parallel hemicube driver.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use itertools::Itertools;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geometry::Triangle;
use crate::hemicube::HemiCube;
use crate::model::Model;
use crate::patch::{Patch, PatchBook, PatchInput};

/// Identifies the model state a view-factor matrix was computed for.
///
/// A stored matrix is only reused when every field matches the current
/// model; otherwise the matrix is recomputed from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewFactorHeader {
    pub n_elements: usize,
    pub resolution: u32,
    pub patch_inputs: Vec<PatchInput>,
}

impl ViewFactorHeader {
    pub fn from_model(model: &Model) -> Self {
        Self {
            n_elements: model.mesh().elements().len(),
            resolution: model.radiation.resolution,
            patch_inputs: model.radiation.patch_inputs.clone(),
        }
    }

    /// Field-by-field validity check with the mismatch reason logged, so a
    /// discarded matrix can be traced back to the change that caused it.
    pub fn matches(&self, model: &Model) -> bool {
        let current = Self::from_model(model);
        if self.n_elements != current.n_elements {
            warn!(
                "stored view factors discarded: element count changed ({} -> {})",
                self.n_elements, current.n_elements
            );
            return false;
        }
        if self.resolution != current.resolution {
            warn!(
                "stored view factors discarded: hemicube resolution changed ({} -> {})",
                self.resolution, current.resolution
            );
            return false;
        }
        if self.patch_inputs != current.patch_inputs {
            warn!("stored view factors discarded: patch definitions changed");
            return false;
        }
        true
    }
}

/// View factors from one emitting patch to every receiving patch it sees.
///
/// Stored as a sparse list of `(patch id, factor)` pairs rather than a map,
/// since most emitters only see a few patches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewFactorRow {
    pub patch: u32,
    pub factors: Vec<(u32, f64)>,
}

impl ViewFactorRow {
    pub fn sum(&self) -> f64 {
        self.factors.iter().map(|(_, f)| f).sum()
    }
}

/// The full view-factor matrix of a model, one row per emitting patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewFactorMatrix {
    header: ViewFactorHeader,
    rows: Vec<ViewFactorRow>,
}

impl ViewFactorMatrix {
    pub fn new(header: ViewFactorHeader, rows: Vec<ViewFactorRow>) -> Self {
        Self { header, rows }
    }

    pub fn header(&self) -> &ViewFactorHeader {
        &self.header
    }

    pub fn rows(&self) -> &[ViewFactorRow] {
        &self.rows
    }

    pub fn row(&self, patch: u32) -> Option<&ViewFactorRow> {
        self.rows.iter().find(|row| row.patch == patch)
    }

    /// View factor from patch `from` to patch `to`, zero when the pair is
    /// absent from the matrix.
    pub fn factor(&self, from: u32, to: u32) -> f64 {
        self.row(from)
            .and_then(|row| row.factors.iter().find(|(q, _)| *q == to))
            .map_or(0.0, |(_, f)| *f)
    }

    /// Load a previously stored matrix. Any I/O or parse failure is logged
    /// and treated as a cache miss.
    pub fn load(path: &Path) -> Option<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => {
                warn!("could not read view factors from {}: {err}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(matrix) => {
                info!("loaded view factors from {}", path.display());
                Some(matrix)
            }
            Err(err) => {
                warn!("could not parse view factors in {}: {err}", path.display());
                None
            }
        }
    }

    /// Store the matrix as JSON. Failures are logged but never fatal; the
    /// matrix is simply recomputed next time.
    pub fn save(&self, path: &Path) {
        let result = serde_json::to_string(self)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
            .and_then(|data| fs::write(path, data));
        match result {
            Ok(()) => info!("stored view factors in {}", path.display()),
            Err(err) => warn!("could not store view factors in {}: {err}", path.display()),
        }
    }
}

/// Compute the full view-factor matrix with one hemicube per emitting
/// patch. Patches are processed in parallel; each hemicube is placed at
/// the patch's area-weighted centroid, looking along its average normal,
/// and rasterizes the triangles of every receiving patch except its own.
pub fn compute_view_factors(model: &Model, book: &PatchBook) -> ViewFactorMatrix {
    let mesh = model.mesh();
    let resolution = model.radiation.resolution as usize;

    // Receiver triangles, tagged with their patch id.
    let mut receiver_triangles: Vec<(u32, Triangle)> = Vec::new();
    for patch in book.patches().iter().filter(|p| p.is_receiver()) {
        for &element_id in patch.element_ids() {
            for triangle in mesh.triangulate_element(element_id) {
                receiver_triangles.push((patch.id(), triangle));
            }
        }
    }

    let emitters: Vec<&Patch> = book.patches().iter().filter(|p| p.is_emitter()).collect();
    let n_emitters = emitters.len();
    info!(
        "computing view factors for {n_emitters} emitting patches ({} receiver triangles, resolution {resolution})",
        receiver_triangles.len()
    );

    let progress = AtomicUsize::new(0);
    let rows: Vec<ViewFactorRow> = emitters
        .par_iter()
        .map(|patch| {
            let eye = patch.centroid(mesh);
            let direction = patch.average_normal(mesh);

            // Nearest-first order lets the z-buffer reject occluded
            // triangles early.
            let candidates = receiver_triangles
                .iter()
                .filter(|(id, _)| *id != patch.id())
                .sorted_by(|a, b| {
                    let da = (a.1.centroid() - eye).norm_squared();
                    let db = (b.1.centroid() - eye).norm_squared();
                    da.total_cmp(&db)
                });

            let mut cube = HemiCube::new(eye, &direction, resolution);
            for (id, triangle) in candidates {
                cube.ray_trace_triangle(triangle, *id);
            }

            let factors = cube.view_factors().into_iter().sorted_by_key(|&(id, _)| id).collect();
            let row = ViewFactorRow {
                patch: patch.id(),
                factors,
            };

            let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                "patch {}: row sum {:.4}, fill ratio {:.3} ({done}/{n_emitters})",
                patch.id(),
                row.sum(),
                cube.fill_ratio()
            );
            row
        })
        .collect();

    ViewFactorMatrix {
        header: ViewFactorHeader::from_model(model),
        rows,
    }
}

/// Return a usable view-factor matrix for the model: the stored matrix if
/// its header still matches, otherwise a fresh computation that replaces
/// the stored file.
pub fn load_or_compute(model: &Model, book: &PatchBook) -> ViewFactorMatrix {
    if let Some(path) = &model.radiation.view_factor_file {
        if let Some(matrix) = ViewFactorMatrix::load(path) {
            if matrix.header.matches(model) {
                return matrix;
            }
        }
        let matrix = compute_view_factors(model, book);
        matrix.save(path);
        matrix
    } else {
        compute_view_factors(model, book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixcompare::assert_scalar_eq;

    fn sample_matrix() -> ViewFactorMatrix {
        ViewFactorMatrix {
            header: ViewFactorHeader {
                n_elements: 4,
                resolution: 50,
                patch_inputs: vec![PatchInput {
                    surface_id: 7,
                    emitter: true,
                    receiver: true,
                    patch_size: 2,
                }],
            },
            rows: vec![
                ViewFactorRow {
                    patch: 0,
                    factors: vec![(1, 0.4), (2, 0.3)],
                },
                ViewFactorRow {
                    patch: 1,
                    factors: vec![(0, 0.4)],
                },
            ],
        }
    }

    #[test]
    fn factor_lookup() {
        let matrix = sample_matrix();
        assert_scalar_eq!(matrix.factor(0, 2), 0.3, comp = abs, tol = 1e-15);
        assert_scalar_eq!(matrix.factor(1, 0), 0.4, comp = abs, tol = 1e-15);
        assert_eq!(matrix.factor(0, 5), 0.0);
        assert_eq!(matrix.factor(9, 0), 0.0);
        assert_scalar_eq!(matrix.row(0).unwrap().sum(), 0.7, comp = abs, tol = 1e-15);
    }

    #[test]
    fn json_round_trip() {
        let matrix = sample_matrix();
        let json = serde_json::to_string(&matrix).unwrap();
        let back: ViewFactorMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back.header, matrix.header);
        assert_eq!(back.rows.len(), matrix.rows.len());
        assert_scalar_eq!(back.factor(0, 1), 0.4, comp = abs, tol = 1e-15);
    }

    #[test]
    fn missing_file_is_a_cache_miss() {
        assert!(ViewFactorMatrix::load(Path::new("/nonexistent/view_factors.json")).is_none());
    }
}
