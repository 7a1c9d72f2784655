use std::fmt;

use geo::{Area, BoundingRect, Centroid};
use geo_types::{Coord, LineString, MultiPolygon, Polygon as GeoPolygon};
use serde::{Deserialize, Serialize};

fn ring_to_linestring(ring: &[[f64; 2]]) -> LineString<f64> {
    let coords: Vec<Coord<f64>> = ring.iter().map(|&[x, y]| Coord { x, y }).collect();
    // LineString::new leaves the ring open; Polygon::new closes it
    LineString::new(coords)
}

/// Axis-aligned box in the polygon's coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max[0] - self.min[0]
    }

    pub fn height(&self) -> f64 {
        self.max[1] - self.min[1]
    }
}

/// A simple closed ring traced from the skeleton.
///
/// Vertices are stored without repeating the first one at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<[f64; 2]>,
    /// Pixel count of the skeleton component the ring was traced from
    pub pixel_count: usize,
}

impl Polygon {
    pub fn new(vertices: Vec<[f64; 2]>, pixel_count: usize) -> Self {
        Self { vertices, pixel_count }
    }

    pub fn to_geo_polygon(&self) -> GeoPolygon<f64> {
        GeoPolygon::new(ring_to_linestring(&self.vertices), vec![])
    }

    /// Shoelace area, positive for counter-clockwise rings
    pub fn signed_area(&self) -> f64 {
        self.to_geo_polygon().signed_area()
    }

    pub fn area(&self) -> f64 {
        self.to_geo_polygon().unsigned_area()
    }

    pub fn centroid(&self) -> Option<[f64; 2]> {
        self.to_geo_polygon().centroid().map(|c| [c.x(), c.y()])
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.to_geo_polygon().bounding_rect().map(|rect| BoundingBox {
            min: [rect.min().x, rect.min().y],
            max: [rect.max().x, rect.max().y],
        })
    }

    /// Reverse the ring if it runs clockwise
    pub fn orient_ccw(&mut self) {
        if self.signed_area() < 0.0 {
            self.vertices.reverse();
        }
    }
}

/// A polygon mapped from pixel space into physical units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledPolygon {
    pub polygon: Polygon,
    /// The `(sx, sy)` factors that were applied
    pub scale: [f64; 2],
}

/// An exterior ring together with the holes cut out of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionShape {
    pub exterior: Vec<[f64; 2]>,
    pub holes: Vec<Vec<[f64; 2]>>,
}

impl SectionShape {
    pub fn solid(exterior: Vec<[f64; 2]>) -> Self {
        Self { exterior, holes: Vec::new() }
    }

    pub fn to_geo_polygon(&self) -> GeoPolygon<f64> {
        GeoPolygon::new(
            ring_to_linestring(&self.exterior),
            self.holes.iter().map(|hole| ring_to_linestring(hole)).collect(),
        )
    }

    /// Area of the shape (exterior minus holes)
    pub fn area(&self) -> f64 {
        self.to_geo_polygon().unsigned_area()
    }

    pub fn has_holes(&self) -> bool {
        !self.holes.is_empty()
    }

    /// Every ring, exterior first
    pub fn rings(&self) -> impl Iterator<Item = &Vec<[f64; 2]>> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }

    /// Total length of all rings, closing segments included
    pub fn perimeter(&self) -> f64 {
        self.rings()
            .map(|ring| {
                ring.iter()
                    .zip(ring.iter().cycle().skip(1))
                    .map(|(a, b)| (b[0] - a[0]).hypot(b[1] - a[1]))
                    .sum::<f64>()
            })
            .sum()
    }
}

/// The material region that gets meshed and integrated
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Section {
    pub shapes: Vec<SectionShape>,
}

impl Section {
    pub fn to_geo(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(self.shapes.iter().map(SectionShape::to_geo_polygon).collect())
    }

    pub fn area(&self) -> f64 {
        self.to_geo().unsigned_area()
    }

    /// Area-weighted centroid of all shapes
    pub fn centroid(&self) -> Option<[f64; 2]> {
        self.to_geo().centroid().map(|c| [c.x(), c.y()])
    }
}

/// Extrusion parameters of a prismatic mesh
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrusion {
    pub depth: f64,
    pub layers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    /// Linear triangle in the section plane
    Triangle { nodes: [usize; 3] },
    /// Six-node prism; nodes 0..3 are the bottom face
    Wedge { nodes: [usize; 6], layer: usize },
}

impl Element {
    pub fn nodes(&self) -> &[usize] {
        match self {
            Self::Triangle { nodes } => nodes,
            Self::Wedge { nodes, .. } => nodes,
        }
    }
}

/// Finite-element mesh of the section.
///
/// Planar meshes keep `z = 0` for every node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub nodes: Vec<[f64; 3]>,
    pub elements: Vec<Element>,
    pub mesh_size: f64,
    pub extrusion: Option<Extrusion>,
}

impl Mesh {
    /// Check that every element references an existing node
    pub fn validate(&self) -> Result<(), String> {
        for (i, element) in self.elements.iter().enumerate() {
            if let Some(&bad) = element.nodes().iter().find(|&&n| n >= self.nodes.len()) {
                return Err(format!(
                    "element {i} references node {bad} but the mesh has {} nodes",
                    self.nodes.len()
                ));
            }
        }
        Ok(())
    }

    /// Triangles covering the cross-section exactly once
    pub fn cross_section_triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.elements.iter().filter_map(|element| match *element {
            Element::Triangle { nodes } => Some(nodes),
            Element::Wedge { nodes, layer: 0 } => Some([nodes[0], nodes[1], nodes[2]]),
            Element::Wedge { .. } => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshSummary {
    pub nodes: usize,
    pub elements: usize,
    /// Cross-section area summed over the mesh
    pub area: f64,
}

/// Geometric properties of a section, about its centroidal axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionProperties {
    pub area: f64,
    pub centroid: [f64; 2],
    pub ix: f64,
    pub iy: f64,
    pub ixy: f64,
    pub mesh: MeshSummary,
}

impl fmt::Display for SectionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "approximate section area: {}", self.area)?;
        writeln!(
            f,
            "approximate section centroid: POINT ({} {})",
            self.centroid[0], self.centroid[1]
        )?;
        writeln!(f, "Area Moment of Inertia about X: {}", self.ix)?;
        write!(f, "Area Moment of Inertia about Y: {}", self.iy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<[f64; 2]> {
        vec![[0.0, 0.0], [size, 0.0], [size, size], [0.0, size]]
    }

    #[test]
    fn test_polygon_area_and_centroid() {
        let polygon = Polygon::new(vec![[0.0, 0.0], [40.0, 0.0], [40.0, 20.0], [0.0, 20.0]], 120);
        assert_eq!(polygon.area(), 800.0);
        let [cx, cy] = polygon.centroid().expect("centroid");
        assert!((cx - 20.0).abs() < 1e-9 && (cy - 10.0).abs() < 1e-9);
        let bbox = polygon.bounding_box().expect("bbox");
        assert_eq!((bbox.width(), bbox.height()), (40.0, 20.0));
    }

    #[test]
    fn test_orient_ccw() {
        let mut polygon = Polygon::new(square(1.0).into_iter().rev().collect(), 4);
        assert!(polygon.signed_area() < 0.0);
        polygon.orient_ccw();
        assert!(polygon.signed_area() > 0.0);
    }

    #[test]
    fn test_shape_with_hole() {
        let shape = SectionShape {
            exterior: square(10.0),
            holes: vec![vec![[2.0, 2.0], [2.0, 4.0], [4.0, 4.0], [4.0, 2.0]]],
        };
        assert!(shape.has_holes());
        assert_eq!(shape.area(), 96.0);
        assert_eq!(shape.perimeter(), 48.0);
    }

    #[test]
    fn test_section_centroid_is_area_weighted() {
        let section = Section {
            shapes: vec![
                SectionShape::solid(square(2.0)),
                SectionShape::solid(vec![[10.0, 0.0], [11.0, 0.0], [11.0, 1.0], [10.0, 1.0]]),
            ],
        };
        assert_eq!(section.area(), 5.0);
        let [cx, _] = section.centroid().expect("centroid");
        assert!((cx - (4.0 * 1.0 + 1.0 * 10.5) / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_mesh_validate_catches_bad_index() {
        let mesh = Mesh {
            nodes: vec![[0.0; 3]; 3],
            elements: vec![Element::Triangle { nodes: [0, 1, 3] }],
            mesh_size: 1.0,
            extrusion: None,
        };
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_report_format() {
        let properties = SectionProperties {
            area: 800.0,
            centroid: [20.0, 10.0],
            ix: 1.0,
            iy: 2.0,
            ixy: 0.0,
            mesh: MeshSummary { nodes: 4, elements: 2, area: 800.0 },
        };
        let report = properties.to_string();
        assert_eq!(
            report,
            "approximate section area: 800\n\
             approximate section centroid: POINT (20 10)\n\
             Area Moment of Inertia about X: 1\n\
             Area Moment of Inertia about Y: 2"
        );
    }
}
