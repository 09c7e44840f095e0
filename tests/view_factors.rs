//! View-factor computation on small analytic geometries.

use nalgebra::{Point3, Vector3};
use radfem::mesh::{Element, ElementType, Mesh, Node};
use radfem::model::{ElementGroup, GroupKind, Model};
use radfem::patch::{PatchBook, PatchInput};
use radfem::view_factor::compute_view_factors;

fn radiating_input(surface_id: u32) -> PatchInput {
    PatchInput {
        surface_id,
        emitter: true,
        receiver: true,
        patch_size: 0,
    }
}

/// Two parallel unit squares one unit apart, facing each other.
fn parallel_plates_model(with_blocker: bool) -> Model {
    let mut nodes = vec![
        Node::new(0.0, 0.0, 0.0),
        Node::new(1.0, 0.0, 0.0),
        Node::new(1.0, 1.0, 0.0),
        Node::new(0.0, 1.0, 0.0),
        Node::new(0.0, 0.0, 1.0),
        Node::new(1.0, 0.0, 1.0),
        Node::new(1.0, 1.0, 1.0),
        Node::new(0.0, 1.0, 1.0),
    ];
    let mut elements = vec![
        // Lower plate, normal +z.
        Element::new(ElementType::Tri3, vec![0, 1, 2]),
        Element::new(ElementType::Tri3, vec![0, 2, 3]),
        // Upper plate, normal -z.
        Element::new(ElementType::Tri3, vec![4, 6, 5]),
        Element::new(ElementType::Tri3, vec![4, 7, 6]),
    ];
    if with_blocker {
        // Oversized plate halfway between, facing the lower plate.
        nodes.extend([
            Node::new(-2.0, -2.0, 0.5),
            Node::new(3.0, -2.0, 0.5),
            Node::new(3.0, 3.0, 0.5),
            Node::new(-2.0, 3.0, 0.5),
        ]);
        elements.push(Element::new(ElementType::Tri3, vec![8, 10, 9]));
        elements.push(Element::new(ElementType::Tri3, vec![8, 11, 10]));
    }
    let mut model = Model::new(Mesh::new(nodes, elements).unwrap());
    model.add_group(ElementGroup::new(1, "lower", GroupKind::Surface, vec![0, 1]));
    model.add_group(ElementGroup::new(2, "upper", GroupKind::Surface, vec![2, 3]));
    model.radiation.resolution = 50;
    model.radiation.patch_inputs = vec![radiating_input(1), radiating_input(2)];
    model
}

#[test]
fn parallel_plates_match_the_point_to_plate_factor() {
    let model = parallel_plates_model(false);
    let book = PatchBook::build(&model);
    let matrix = compute_view_factors(&model, &book);

    // The hemicube sits at the patch centroid, so the reference value is
    // the differential factor from the plate center to the opposite plate:
    // four dA-to-rectangle corner terms with X = Y = 0.5.
    let (x, y) = (0.5f64, 0.5f64);
    let corner = (x / (1.0 + x * x).sqrt() * (y / (1.0 + x * x).sqrt()).atan()
        + y / (1.0 + y * y).sqrt() * (x / (1.0 + y * y).sqrt()).atan())
        / (2.0 * std::f64::consts::PI);
    let reference = 4.0 * corner;

    let f01 = matrix.factor(0, 1);
    let f10 = matrix.factor(1, 0);
    assert!(
        (f01 - reference).abs() < 0.02,
        "F(lower -> upper) = {f01}, reference {reference}"
    );
    // The configuration is symmetric.
    assert!((f01 - f10).abs() < 0.01);
    for row in matrix.rows() {
        assert!(row.sum() <= 1.0 + 1e-9);
    }
}

#[test]
fn opaque_plate_between_the_plates_blocks_the_exchange() {
    let mut model = parallel_plates_model(true);
    model.add_group(ElementGroup::new(3, "blocker", GroupKind::Surface, vec![4, 5]));
    model.radiation.patch_inputs.push(PatchInput {
        surface_id: 3,
        emitter: false,
        receiver: true,
        patch_size: 0,
    });

    let book = PatchBook::build(&model);
    let matrix = compute_view_factors(&model, &book);
    // Patch ids follow group order: 0 lower, 1 upper, 2 blocker.
    assert!(matrix.factor(0, 1) < 1e-3, "upper plate should be hidden");
    assert!(matrix.factor(0, 2) > 0.5, "blocker should dominate the view");
}

/// Closed unit box, every face one patch with its normal pointing inward.
fn closed_box_model() -> Model {
    let corners = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(0.0, 1.0, 1.0),
    ];
    let faces: [[usize; 4]; 6] = [
        [0, 1, 2, 3],
        [4, 5, 6, 7],
        [0, 1, 5, 4],
        [2, 3, 7, 6],
        [1, 2, 6, 5],
        [3, 0, 4, 7],
    ];
    let center = Point3::new(0.5, 0.5, 0.5);
    let nodes = corners
        .iter()
        .map(|p| Node::new(p.x, p.y, p.z))
        .collect::<Vec<_>>();

    let mut elements = Vec::new();
    let mut inward_triangle = |a: usize, b: usize, c: usize| {
        let normal: Vector3<f64> =
            (corners[b] - corners[a]).cross(&(corners[c] - corners[a]));
        let centroid = Point3::from(
            (corners[a].coords + corners[b].coords + corners[c].coords) / 3.0,
        );
        if normal.dot(&(center - centroid)) >= 0.0 {
            elements.push(Element::new(ElementType::Tri3, vec![a, b, c]));
        } else {
            elements.push(Element::new(ElementType::Tri3, vec![a, c, b]));
        }
    };
    for face in faces {
        inward_triangle(face[0], face[1], face[2]);
        inward_triangle(face[0], face[2], face[3]);
    }

    let mut model = Model::new(Mesh::new(nodes, elements).unwrap());
    for (i, _) in faces.iter().enumerate() {
        let id = i as u32 + 1;
        model.add_group(ElementGroup::new(
            id,
            format!("face-{id}"),
            GroupKind::Surface,
            vec![2 * i, 2 * i + 1],
        ));
        model.radiation.patch_inputs.push(radiating_input(id));
    }
    model.radiation.resolution = 40;
    model
}

#[test]
fn closed_box_rows_sum_to_one() {
    let model = closed_box_model();
    let book = PatchBook::build(&model);
    assert_eq!(book.patches().len(), 6);
    let matrix = compute_view_factors(&model, &book);

    for row in matrix.rows() {
        let sum = row.sum();
        assert!(
            sum > 0.95 && sum <= 1.0 + 1e-9,
            "enclosure row {} sums to {sum}",
            row.patch
        );
    }
    // All faces have unit area, so reciprocity reduces to symmetry.
    for i in 0..6u32 {
        for j in 0..6u32 {
            let diff = (matrix.factor(i, j) - matrix.factor(j, i)).abs();
            assert!(diff < 0.02, "F({i},{j}) asymmetry {diff}");
        }
    }
}
