use std::collections::{HashMap, HashSet, VecDeque};

use spade::handles::{FixedFaceHandle, InnerTag};
use spade::{
    AngleLimit, ConstrainedDelaunayTriangulation, InsertionError, Point2, RefinementParameters,
    Triangulation,
};
use tracing::{debug, warn};

use crate::{
    config::MAX_EXTRUSION_LAYERS,
    error::{Result, SectionError},
    traits::MeshBackend,
    types::{Element, Extrusion, Mesh},
    worker::MeshRequest,
};

type Cdt = ConstrainedDelaunayTriangulation<Point2<f64>>;

/// Constrained Delaunay mesher with area refinement
#[derive(Debug, Clone)]
pub struct SpadeMeshBackend {
    /// Smallest interior angle refinement tries to reach
    pub angle_limit_degrees: f64,
}

impl Default for SpadeMeshBackend {
    fn default() -> Self {
        Self { angle_limit_degrees: 25.0 }
    }
}

impl MeshBackend for SpadeMeshBackend {
    fn generate(&self, request: &MeshRequest) -> Result<Mesh> {
        let mesh_size = request.mesh_size;
        if !(mesh_size.is_finite() && mesh_size > 0.0) {
            return Err(failed(format!("mesh size must be positive, got {mesh_size}")));
        }
        if request.section.shapes.is_empty() {
            return Err(failed("section has no shapes".into()));
        }

        let mut cdt = Cdt::new();
        for shape in &request.section.shapes {
            for ring in shape.rings() {
                if ring.len() < 3 {
                    return Err(failed(format!("ring with {} vertices", ring.len())));
                }
                insert_constraint_loop(&mut cdt, &densify(ring, mesh_size))?;
            }
        }

        let max_area = 3f64.sqrt() / 4.0 * mesh_size * mesh_size;
        let refinement = cdt.refine(
            RefinementParameters::<f64>::new()
                .exclude_outer_faces(true)
                .with_max_allowed_area(max_area)
                .with_angle_limit(AngleLimit::from_deg(self.angle_limit_degrees))
                .with_max_additional_vertices(request.max_additional_vertices),
        );
        if !refinement.refinement_complete {
            warn!(
                "Refinement stopped at the {} additional vertex limit",
                request.max_additional_vertices
            );
        }

        let (planar_nodes, triangles) = collect_interior(&cdt);
        if triangles.is_empty() {
            return Err(failed("no interior triangles; the section encloses no area".into()));
        }
        debug!(
            "Meshed {} nodes, {} triangles (max area {:.4})",
            planar_nodes.len(),
            triangles.len(),
            max_area
        );

        Ok(match request.extrude {
            Some(depth) => extrude(&planar_nodes, &triangles, depth, mesh_size)?,
            None => Mesh {
                nodes: planar_nodes.iter().map(|&[x, y]| [x, y, 0.0]).collect(),
                elements: triangles
                    .into_iter()
                    .map(|nodes| Element::Triangle { nodes })
                    .collect(),
                mesh_size,
                extrusion: None,
            },
        })
    }
}

fn failed(message: String) -> SectionError {
    SectionError::MeshGenerationFailed(message)
}

/// Split ring edges so that no boundary segment exceeds `max_length`
fn densify(ring: &[[f64; 2]], max_length: f64) -> Vec<Point2<f64>> {
    let mut points = Vec::with_capacity(ring.len());
    for (i, &[ax, ay]) in ring.iter().enumerate() {
        let [bx, by] = ring[(i + 1) % ring.len()];
        points.push(Point2::new(ax, ay));
        let steps = ((bx - ax).hypot(by - ay) / max_length).ceil();
        if steps.is_finite() && steps > 1.0 {
            let steps = steps as usize;
            for k in 1..steps {
                let t = k as f64 / steps as f64;
                points.push(Point2::new(ax + t * (bx - ax), ay + t * (by - ay)));
            }
        }
    }
    points
}

/// Inserts a closed ring as constraint edges into the CDT.
fn insert_constraint_loop(cdt: &mut Cdt, points: &[Point2<f64>]) -> Result<()> {
    let mut handles = Vec::with_capacity(points.len());
    for &point in points {
        let handle = cdt
            .insert(point)
            .map_err(|e: InsertionError| failed(format!("vertex ({}, {}): {e}", point.x, point.y)))?;
        handles.push(handle);
    }

    for i in 0..handles.len() {
        let from = handles[i];
        let to = handles[(i + 1) % handles.len()];
        if from == to {
            continue;
        }
        if !cdt.can_add_constraint(from, to) {
            return Err(failed("boundary intersects itself or another ring".into()));
        }
        cdt.add_constraint(from, to);
    }
    Ok(())
}

/// Interior triangles and the nodes they use, renumbered densely
fn collect_interior(cdt: &Cdt) -> (Vec<[f64; 2]>, Vec<[usize; 3]>) {
    let interior = classify_interior_faces(cdt);
    let mut nodes = Vec::new();
    let mut node_of_vertex: HashMap<usize, usize> = HashMap::new();
    let mut triangles = Vec::with_capacity(interior.len());

    for face in cdt.inner_faces() {
        if !interior.contains(&face.fix().index()) {
            continue;
        }
        let mut triangle = [0usize; 3];
        for (slot, vertex) in face.vertices().iter().enumerate() {
            triangle[slot] = *node_of_vertex.entry(vertex.fix().index()).or_insert_with(|| {
                let position = vertex.position();
                nodes.push([position.x, position.y]);
                nodes.len() - 1
            });
        }
        triangles.push(triangle);
    }
    (nodes, triangles)
}

/// Faces separated from the outer face by an odd number of constraint edges.
///
/// Flood fill starting from the faces along the convex hull.
fn classify_interior_faces(cdt: &Cdt) -> HashSet<usize> {
    let mut interior = HashSet::new();
    let mut depth_of: HashMap<usize, u32> = HashMap::new();
    let mut queue: VecDeque<(FixedFaceHandle<InnerTag>, u32)> = VecDeque::new();
    let outer = cdt.outer_face().fix();

    for edge in cdt.directed_edges() {
        if edge.face().fix() != outer {
            continue;
        }
        let Some(inner) = edge.rev().face().as_inner() else {
            continue;
        };
        let index = inner.fix().index();
        if depth_of.contains_key(&index) {
            continue;
        }
        let depth = u32::from(cdt.is_constraint_edge(edge.as_undirected().fix()));
        depth_of.insert(index, depth);
        if depth % 2 == 1 {
            interior.insert(index);
        }
        queue.push_back((inner.fix(), depth));
    }

    while let Some((face, depth)) = queue.pop_front() {
        for edge in cdt.face(face).adjacent_edges() {
            let Some(neighbour) = edge.rev().face().as_inner() else {
                continue;
            };
            let index = neighbour.fix().index();
            if depth_of.contains_key(&index) {
                continue;
            }
            let depth = depth + u32::from(cdt.is_constraint_edge(edge.as_undirected().fix()));
            depth_of.insert(index, depth);
            if depth % 2 == 1 {
                interior.insert(index);
            }
            queue.push_back((neighbour.fix(), depth));
        }
    }

    interior
}

/// Sweep the planar triangulation into layers of wedges along z
fn extrude(planar: &[[f64; 2]], triangles: &[[usize; 3]], depth: f64, mesh_size: f64) -> Result<Mesh> {
    if !(depth.is_finite() && depth > 0.0) {
        return Err(failed(format!("extrusion depth must be positive, got {depth}")));
    }
    let layers = (depth / mesh_size).ceil();
    if !(layers <= MAX_EXTRUSION_LAYERS as f64) {
        return Err(failed(format!(
            "extrusion needs {layers} layers, more than {MAX_EXTRUSION_LAYERS}"
        )));
    }
    let layers = (layers as usize).max(1);
    let per_layer = planar.len();

    let nodes = (0..=layers)
        .flat_map(|k| {
            let z = depth * k as f64 / layers as f64;
            planar.iter().map(move |&[x, y]| [x, y, z])
        })
        .collect();
    let elements = (0..layers)
        .flat_map(|layer| {
            let bottom = layer * per_layer;
            let top = bottom + per_layer;
            triangles.iter().map(move |&[a, b, c]| Element::Wedge {
                nodes: [bottom + a, bottom + b, bottom + c, top + a, top + b, top + c],
                layer,
            })
        })
        .collect();

    Ok(Mesh {
        nodes,
        elements,
        mesh_size,
        extrusion: Some(Extrusion { depth, layers }),
    })
}
