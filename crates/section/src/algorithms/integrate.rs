use crate::{
    error::{Result, SectionError},
    traits::{Integrated, PropertyIntegrator},
    types::Mesh,
};

/// Closed-form second moments of linear triangles.
///
/// For a triangle with vertices relative to the reference point:
/// `Ix = A/6 Σ(yi² + yi·yj)`, `Iy = A/6 Σ(xi² + xi·xj)`,
/// `Ixy = A/12 (2 Σ xi·yi + Σ(i≠j) xi·yj)`.
#[derive(Debug, Clone, Default)]
pub struct TriangleIntegrator;

impl PropertyIntegrator for TriangleIntegrator {
    fn integrate(&self, mesh: &Mesh, centroid: [f64; 2]) -> Result<Integrated> {
        mesh.validate().map_err(SectionError::Integration)?;

        let mut total = Integrated { area: 0.0, ix: 0.0, iy: 0.0, ixy: 0.0 };
        let mut triangles = 0usize;
        for [a, b, c] in mesh.cross_section_triangles() {
            let relative = |n: usize| [mesh.nodes[n][0] - centroid[0], mesh.nodes[n][1] - centroid[1]];
            let [x1, y1] = relative(a);
            let [x2, y2] = relative(b);
            let [x3, y3] = relative(c);

            let area = ((x2 - x1) * (y3 - y1) - (x3 - x1) * (y2 - y1)).abs() / 2.0;
            total.area += area;
            total.ix += area / 6.0 * (y1 * y1 + y2 * y2 + y3 * y3 + y1 * y2 + y2 * y3 + y3 * y1);
            total.iy += area / 6.0 * (x1 * x1 + x2 * x2 + x3 * x3 + x1 * x2 + x2 * x3 + x3 * x1);
            total.ixy += area / 12.0
                * (2.0 * (x1 * y1 + x2 * y2 + x3 * y3)
                    + x1 * y2
                    + x2 * y1
                    + x2 * y3
                    + x3 * y2
                    + x3 * y1
                    + x1 * y3);
            triangles += 1;
        }

        if triangles == 0 {
            return Err(SectionError::Integration("mesh has no cross-section triangles".into()));
        }
        if ![total.area, total.ix, total.iy, total.ixy].iter().all(|v| v.is_finite()) {
            return Err(SectionError::Integration("non-finite integral".into()));
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Element;

    fn rectangle_mesh(width: f64, height: f64) -> Mesh {
        Mesh {
            nodes: vec![
                [0.0, 0.0, 0.0],
                [width, 0.0, 0.0],
                [width, height, 0.0],
                [0.0, height, 0.0],
            ],
            elements: vec![
                Element::Triangle { nodes: [0, 1, 2] },
                Element::Triangle { nodes: [0, 2, 3] },
            ],
            mesh_size: width.max(height),
            extrusion: None,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_rectangle_matches_closed_form() {
        let integrated = TriangleIntegrator
            .integrate(&rectangle_mesh(40.0, 20.0), [20.0, 10.0])
            .expect("Should integrate");

        assert!(close(integrated.area, 800.0));
        assert!(close(integrated.ix, 40.0 * 20f64.powi(3) / 12.0));
        assert!(close(integrated.iy, 20.0 * 40f64.powi(3) / 12.0));
        assert!(integrated.ixy.abs() < 1e-9);
    }

    #[test]
    fn test_square_is_symmetric() {
        let integrated = TriangleIntegrator
            .integrate(&rectangle_mesh(10.0, 10.0), [5.0, 5.0])
            .expect("Should integrate");
        assert!(close(integrated.ix, integrated.iy));
    }

    #[test]
    fn test_product_of_inertia_about_corner() {
        // ∫xy over [0,b]x[0,h] is b²h²/4
        let integrated = TriangleIntegrator
            .integrate(&rectangle_mesh(4.0, 2.0), [0.0, 0.0])
            .expect("Should integrate");
        assert!(close(integrated.ixy, 16.0));
    }

    #[test]
    fn test_clockwise_triangles_count_positively() {
        let mut mesh = rectangle_mesh(40.0, 20.0);
        mesh.elements = vec![
            Element::Triangle { nodes: [2, 1, 0] },
            Element::Triangle { nodes: [3, 2, 0] },
        ];
        let integrated = TriangleIntegrator.integrate(&mesh, [20.0, 10.0]).expect("Should integrate");
        assert!(close(integrated.area, 800.0));
    }

    #[test]
    fn test_only_bottom_layer_of_wedges_counts() {
        let mut mesh = rectangle_mesh(40.0, 20.0);
        let planar = mesh.nodes.clone();
        for z in [5.0, 10.0] {
            mesh.nodes.extend(planar.iter().map(|&[x, y, _]| [x, y, z]));
        }
        mesh.elements = (0..2usize)
            .flat_map(|layer| {
                let (lo, hi) = (layer * 4, layer * 4 + 4);
                [[0, 1, 2], [0, 2, 3]].map(|[a, b, c]| Element::Wedge {
                    nodes: [lo + a, lo + b, lo + c, hi + a, hi + b, hi + c],
                    layer,
                })
            })
            .collect();

        let integrated = TriangleIntegrator.integrate(&mesh, [20.0, 10.0]).expect("Should integrate");
        assert!(close(integrated.area, 800.0));
    }

    #[test]
    fn test_invalid_meshes_are_rejected() {
        let empty = Mesh::default();
        assert!(matches!(
            TriangleIntegrator.integrate(&empty, [0.0, 0.0]),
            Err(SectionError::Integration(_))
        ));

        let mut dangling = rectangle_mesh(1.0, 1.0);
        dangling.elements.push(Element::Triangle { nodes: [0, 1, 9] });
        assert!(matches!(
            TriangleIntegrator.integrate(&dangling, [0.0, 0.0]),
            Err(SectionError::Integration(_))
        ));

        let mut nan = rectangle_mesh(1.0, 1.0);
        nan.nodes[2] = [f64::NAN, 1.0, 0.0];
        assert!(TriangleIntegrator.integrate(&nan, [0.0, 0.0]).is_err());
    }
}
