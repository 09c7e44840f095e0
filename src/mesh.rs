//! Mesh data structures: nodes, elements and element groups.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::SolverError;
use crate::geometry::Triangle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub position: Point3<f64>,
}

impl Node {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Point3::new(x, y, z),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Point1,
    Line2,
    Tri3,
    Quad4,
    Tetra4,
}

impl ElementType {
    pub fn num_nodes(&self) -> usize {
        match self {
            Self::Point1 => 1,
            Self::Line2 => 2,
            Self::Tri3 => 3,
            Self::Quad4 => 4,
            Self::Tetra4 => 4,
        }
    }

    pub fn is_surface(&self) -> bool {
        matches!(self, Self::Tri3 | Self::Quad4)
    }

    pub fn is_volume(&self) -> bool {
        matches!(self, Self::Tetra4)
    }
}

/// An element referencing nodes of the owning [`Mesh`] by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    element_type: ElementType,
    node_ids: Vec<usize>,
}

impl Element {
    pub fn new(element_type: ElementType, node_ids: Vec<usize>) -> Self {
        assert_eq!(
            node_ids.len(),
            element_type.num_nodes(),
            "node count must match element type"
        );
        Self {
            element_type,
            node_ids,
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn node_ids(&self) -> &[usize] {
        &self.node_ids
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    nodes: Vec<Node>,
    elements: Vec<Element>,
}

impl Mesh {
    /// Build a mesh, verifying that every element references valid nodes.
    pub fn new(nodes: Vec<Node>, elements: Vec<Element>) -> Result<Self, SolverError> {
        for (idx, element) in elements.iter().enumerate() {
            if let Some(&bad) = element.node_ids.iter().find(|&&id| id >= nodes.len()) {
                return Err(SolverError::InvalidModel {
                    message: format!(
                        "element {} references node {} but the mesh has {} nodes",
                        idx,
                        bad,
                        nodes.len()
                    ),
                });
            }
        }
        Ok(Self { nodes, elements })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn node_position(&self, node_id: usize) -> Point3<f64> {
        self.nodes[node_id].position
    }

    pub fn element_positions(&self, element_id: usize) -> Vec<Point3<f64>> {
        self.elements[element_id]
            .node_ids
            .iter()
            .map(|&id| self.nodes[id].position)
            .collect()
    }

    pub fn element_center(&self, element_id: usize) -> Point3<f64> {
        let positions = self.element_positions(element_id);
        let sum: Vector3<f64> = positions.iter().map(|p| p.coords).sum();
        Point3::from(sum / positions.len() as f64)
    }

    /// Length of a line element.
    pub fn element_length(&self, element_id: usize) -> f64 {
        let p = self.element_positions(element_id);
        debug_assert_eq!(self.elements[element_id].element_type, ElementType::Line2);
        (p[1] - p[0]).norm()
    }

    /// Area of a surface element.
    pub fn element_area(&self, element_id: usize) -> f64 {
        self.triangulate_element(element_id)
            .iter()
            .map(Triangle::area)
            .sum()
    }

    /// Volume of a volume element. Uses the absolute value so that node
    /// ordering does not flip the sign.
    pub fn element_volume(&self, element_id: usize) -> f64 {
        let p = self.element_positions(element_id);
        debug_assert_eq!(self.elements[element_id].element_type, ElementType::Tetra4);
        ((p[1] - p[0]).cross(&(p[2] - p[0]))).dot(&(p[3] - p[0])).abs() / 6.0
    }

    /// Generalized measure by element dimensionality: length for lines,
    /// area for surfaces, volume for volumes, zero for points.
    pub fn element_measure(&self, element_id: usize) -> f64 {
        match self.elements[element_id].element_type {
            ElementType::Point1 => 0.0,
            ElementType::Line2 => self.element_length(element_id),
            ElementType::Tri3 | ElementType::Quad4 => self.element_area(element_id),
            ElementType::Tetra4 => self.element_volume(element_id),
        }
    }

    /// Average outward normal of a surface element.
    pub fn element_normal(&self, element_id: usize) -> Vector3<f64> {
        let tris = self.triangulate_element(element_id);
        let n: Vector3<f64> = tris.iter().map(|t| t.normal() * t.area()).sum();
        let norm = n.norm();
        if norm == 0.0 {
            Vector3::zeros()
        } else {
            n / norm
        }
    }

    /// Triangulated geometry of a surface element: a `Tri3` maps to itself,
    /// a `Quad4` is split along its first diagonal. Non-surface elements
    /// yield no triangles.
    pub fn triangulate_element(&self, element_id: usize) -> Vec<Triangle> {
        let element = &self.elements[element_id];
        let p = self.element_positions(element_id);
        match element.element_type {
            ElementType::Tri3 => vec![Triangle::new(p[0], p[1], p[2])],
            ElementType::Quad4 => vec![
                Triangle::new(p[0], p[1], p[2]),
                Triangle::new(p[0], p[2], p[3]),
            ],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
impl Mesh {
    /// Unit tetrahedron plus its base triangle, shared by solver tests.
    pub(crate) fn unit_tetra_mesh() -> Mesh {
        let nodes = vec![
            Node::new(0.0, 0.0, 0.0),
            Node::new(1.0, 0.0, 0.0),
            Node::new(0.0, 1.0, 0.0),
            Node::new(0.0, 0.0, 1.0),
        ];
        let elements = vec![
            Element::new(ElementType::Tetra4, vec![0, 1, 2, 3]),
            Element::new(ElementType::Tri3, vec![0, 1, 2]),
        ];
        Mesh::new(nodes, elements).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixcompare::assert_scalar_eq;

    fn unit_tetra_mesh() -> Mesh {
        Mesh::unit_tetra_mesh()
    }

    #[test]
    fn measures() {
        let mesh = unit_tetra_mesh();
        assert_scalar_eq!(mesh.element_volume(0), 1.0 / 6.0, comp = abs, tol = 1e-14);
        assert_scalar_eq!(mesh.element_area(1), 0.5, comp = abs, tol = 1e-14);
        assert_scalar_eq!(mesh.element_measure(0), 1.0 / 6.0, comp = abs, tol = 1e-14);
    }

    #[test]
    fn quad_triangulation_covers_area() {
        let nodes = vec![
            Node::new(0.0, 0.0, 0.0),
            Node::new(2.0, 0.0, 0.0),
            Node::new(2.0, 1.0, 0.0),
            Node::new(0.0, 1.0, 0.0),
        ];
        let elements = vec![Element::new(ElementType::Quad4, vec![0, 1, 2, 3])];
        let mesh = Mesh::new(nodes, elements).unwrap();
        assert_eq!(mesh.triangulate_element(0).len(), 2);
        assert_scalar_eq!(mesh.element_area(0), 2.0, comp = abs, tol = 1e-14);
    }

    #[test]
    fn invalid_node_reference_is_rejected() {
        let nodes = vec![Node::new(0.0, 0.0, 0.0), Node::new(1.0, 0.0, 0.0)];
        let elements = vec![Element::new(ElementType::Line2, vec![0, 7])];
        assert!(Mesh::new(nodes, elements).is_err());
    }
}
