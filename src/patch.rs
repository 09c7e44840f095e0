//! Radiation patches: contiguous groups of surface elements that exchange
//! radiative heat through view factors.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::mesh::Mesh;
use crate::model::{GroupKind, Model};

/// Per-surface radiation input: whether the surface emits and/or receives,
/// and how many elements may share one patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchInput {
    /// Id of the surface group this input applies to.
    pub surface_id: u32,
    pub emitter: bool,
    pub receiver: bool,
    /// Maximum number of elements per patch; 0 collapses the whole surface
    /// into a single patch.
    pub patch_size: usize,
}

#[derive(Debug, Clone)]
pub struct Patch {
    id: u32,
    surface_id: u32,
    element_ids: Vec<usize>,
    emitter: bool,
    receiver: bool,
}

impl Patch {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn surface_id(&self) -> u32 {
        self.surface_id
    }

    pub fn element_ids(&self) -> &[usize] {
        &self.element_ids
    }

    pub fn is_emitter(&self) -> bool {
        self.emitter
    }

    pub fn is_receiver(&self) -> bool {
        self.receiver
    }

    pub fn area(&self, mesh: &Mesh) -> f64 {
        self.element_ids.iter().map(|&e| mesh.element_area(e)).sum()
    }

    /// Area-weighted centroid, used as the hemicube eye position.
    pub fn centroid(&self, mesh: &Mesh) -> Point3<f64> {
        let mut sum = Vector3::zeros();
        let mut total_area = 0.0;
        for &element_id in &self.element_ids {
            let area = mesh.element_area(element_id);
            sum += mesh.element_center(element_id).coords * area;
            total_area += area;
        }
        if total_area > 0.0 {
            Point3::from(sum / total_area)
        } else {
            Point3::origin()
        }
    }

    /// Area-weighted average normal, used as the hemicube eye direction.
    pub fn average_normal(&self, mesh: &Mesh) -> Vector3<f64> {
        let n: Vector3<f64> = self
            .element_ids
            .iter()
            .map(|&e| mesh.element_normal(e) * mesh.element_area(e))
            .sum();
        let norm = n.norm();
        if norm > 0.0 {
            n / norm
        } else {
            Vector3::x()
        }
    }
}

/// All patches of a model, together with the signature they were built for.
///
/// The book is created once per radiative-heat run and reused while the
/// signature (element count, hemicube resolution, patch inputs) matches the
/// model; any change invalidates it and forces a rebuild.
#[derive(Debug, Clone)]
pub struct PatchBook {
    patches: Vec<Patch>,
    n_elements: usize,
    resolution: u32,
    patch_inputs: Vec<PatchInput>,
}

impl PatchBook {
    pub fn build(model: &Model) -> Self {
        let mut patches = Vec::new();
        for group in model.groups() {
            if group.kind != GroupKind::Surface {
                continue;
            }
            let Some(input) = model
                .radiation
                .patch_inputs
                .iter()
                .find(|i| i.surface_id == group.id)
            else {
                continue;
            };
            let chunk = if input.patch_size == 0 {
                group.element_ids.len().max(1)
            } else {
                input.patch_size
            };
            for element_ids in group.element_ids.chunks(chunk) {
                patches.push(Patch {
                    id: patches.len() as u32,
                    surface_id: group.id,
                    element_ids: element_ids.to_vec(),
                    emitter: input.emitter,
                    receiver: input.receiver,
                });
            }
        }
        Self {
            patches,
            n_elements: model.mesh().elements().len(),
            resolution: model.radiation.resolution,
            patch_inputs: model.radiation.patch_inputs.clone(),
        }
    }

    /// Whether this book is still valid for the model: mesh topology,
    /// resolution and patch definitions are all unchanged.
    pub fn is_valid_for(&self, model: &Model) -> bool {
        self.n_elements == model.mesh().elements().len()
            && self.resolution == model.radiation.resolution
            && self.patch_inputs == model.radiation.patch_inputs
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn patch(&self, id: u32) -> Option<&Patch> {
        self.patches.get(id as usize)
    }

    /// Patch owning the given element, if any.
    pub fn patch_of_element(&self, element_id: usize) -> Option<&Patch> {
        self.patches
            .iter()
            .find(|p| p.element_ids.contains(&element_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Element, ElementType, Node};
    use crate::model::ElementGroup;

    fn surface_model(patch_size: usize) -> Model {
        let nodes = vec![
            Node::new(0.0, 0.0, 0.0),
            Node::new(1.0, 0.0, 0.0),
            Node::new(1.0, 1.0, 0.0),
            Node::new(0.0, 1.0, 0.0),
            Node::new(2.0, 0.0, 0.0),
            Node::new(2.0, 1.0, 0.0),
        ];
        let elements = vec![
            Element::new(ElementType::Tri3, vec![0, 1, 2]),
            Element::new(ElementType::Tri3, vec![0, 2, 3]),
            Element::new(ElementType::Tri3, vec![1, 4, 5]),
            Element::new(ElementType::Tri3, vec![1, 5, 2]),
        ];
        let mut model = Model::new(crate::mesh::Mesh::new(nodes, elements).unwrap());
        model.add_group(ElementGroup::new(
            7,
            "plate",
            GroupKind::Surface,
            vec![0, 1, 2, 3],
        ));
        model.radiation.resolution = 50;
        model.radiation.patch_inputs = vec![PatchInput {
            surface_id: 7,
            emitter: true,
            receiver: true,
            patch_size,
        }];
        model
    }

    #[test]
    fn chunked_patches() {
        let model = surface_model(2);
        let book = PatchBook::build(&model);
        assert_eq!(book.patches().len(), 2);
        assert_eq!(book.patches()[0].element_ids(), &[0, 1]);
        assert_eq!(book.patch_of_element(3).unwrap().id(), 1);
        assert!(book.is_valid_for(&model));
    }

    #[test]
    fn resolution_change_invalidates() {
        let mut model = surface_model(0);
        let book = PatchBook::build(&model);
        assert_eq!(book.patches().len(), 1);
        model.radiation.resolution = 100;
        assert!(!book.is_valid_for(&model));
    }

    #[test]
    fn centroid_and_normal() {
        let model = surface_model(0);
        let book = PatchBook::build(&model);
        let patch = &book.patches()[0];
        // Four equal-area triangles spanning x in [0, 2], y in [0, 1].
        let c = patch.centroid(model.mesh());
        assert!((c.x - 1.0).abs() < 1e-12 && (c.y - 0.5).abs() < 1e-12);
        let n = patch.average_normal(model.mesh());
        assert!((n.z.abs() - 1.0).abs() < 1e-12);
    }
}
