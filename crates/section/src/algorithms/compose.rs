use geo::{Area, Contains};
use geo_types::Polygon as GeoPolygon;
use tracing::debug;

use crate::{
    config::CompositionPolicy,
    error::{Result, SectionError},
    types::{ScaledPolygon, Section, SectionShape},
};

/// Combine scaled polygons into the section that gets meshed
pub fn compose(polygons: &[ScaledPolygon], policy: CompositionPolicy) -> Result<Section> {
    let primary = polygons
        .first()
        .ok_or_else(|| SectionError::DegenerateGeometry("no polygon to compose".into()))?;

    let section = match policy {
        CompositionPolicy::Primary => Section {
            shapes: vec![SectionShape::solid(primary.polygon.vertices.clone())],
        },
        CompositionPolicy::PrimaryWithHoles => {
            let outer = primary.polygon.to_geo_polygon();
            let holes = polygons[1..]
                .iter()
                .filter(|candidate| outer.contains(&candidate.polygon.to_geo_polygon()))
                .map(|hole| hole.polygon.vertices.clone())
                .collect();
            Section {
                shapes: vec![SectionShape {
                    exterior: primary.polygon.vertices.clone(),
                    holes,
                }],
            }
        }
        CompositionPolicy::EvenOdd => even_odd(polygons),
    };

    debug!(
        "Composed {} shape(s) with {} hole(s) using {:?}",
        section.shapes.len(),
        section.shapes.iter().map(|s| s.holes.len()).sum::<usize>(),
        policy
    );
    Ok(section)
}

/// Rings nested an even number of times are material, odd ones are holes
/// of their innermost container
fn even_odd(polygons: &[ScaledPolygon]) -> Section {
    let geo: Vec<GeoPolygon<f64>> = polygons.iter().map(|p| p.polygon.to_geo_polygon()).collect();
    let containers: Vec<Vec<usize>> = (0..geo.len())
        .map(|i| {
            (0..geo.len())
                .filter(|&j| j != i && geo[j].contains(&geo[i]))
                .collect()
        })
        .collect();

    let mut shapes = Vec::new();
    let mut shape_of_ring = vec![None; geo.len()];
    for (i, polygon) in polygons.iter().enumerate() {
        if containers[i].len() % 2 == 0 {
            shape_of_ring[i] = Some(shapes.len());
            shapes.push(SectionShape::solid(polygon.polygon.vertices.clone()));
        }
    }

    for (i, polygon) in polygons.iter().enumerate() {
        if containers[i].len() % 2 == 0 {
            continue;
        }
        // innermost container is the smallest one
        let parent = containers[i]
            .iter()
            .copied()
            .filter(|&j| containers[j].len() + 1 == containers[i].len())
            .min_by(|&a, &b| geo[a].unsigned_area().total_cmp(&geo[b].unsigned_area()));
        if let Some(shape) = parent.and_then(|j| shape_of_ring[j]) {
            shapes[shape].holes.push(polygon.polygon.vertices.clone());
        }
    }

    Section { shapes }
}
