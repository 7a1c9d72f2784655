use std::collections::HashMap;

use geo_types::{Coord, LineString};
use image::{GrayImage, Luma};
use imageproc::{
    contours::{find_contours, BorderType},
    region_labelling::{connected_components, Connectivity},
};
use tracing::debug;

use crate::{
    config::SectionConfig,
    error::{Result, SectionError},
    traits::PolygonExtractor,
    types::Polygon,
};

/// Polygonizer tracing the outer border of each skeleton component
#[derive(Debug, Clone, Default)]
pub struct SkeletonPolygonizer;

impl PolygonExtractor for SkeletonPolygonizer {
    fn extract_polygons(&self, skeleton: &GrayImage, config: &SectionConfig) -> Result<Vec<Polygon>> {
        let labels = connected_components(skeleton, Connectivity::Eight, Luma([0u8]));

        let mut sizes: HashMap<u32, usize> = HashMap::new();
        for pixel in labels.pixels() {
            if pixel[0] != 0 {
                *sizes.entry(pixel[0]).or_default() += 1;
            }
        }
        let largest_component = sizes.values().copied().max().unwrap_or(0);
        let minimum = config.minimum_connected_pixels as usize;

        // Largest component first, label order breaks ties
        let mut components: Vec<(u32, usize)> =
            sizes.into_iter().filter(|&(_, size)| size >= minimum).collect();
        components.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        debug!(
            "{} skeleton components survive the {} pixel filter",
            components.len(),
            minimum
        );

        let mut polygons = Vec::with_capacity(components.len());
        for (label, pixel_count) in components {
            let mask = GrayImage::from_fn(labels.width(), labels.height(), |x, y| {
                Luma([if labels.get_pixel(x, y)[0] == label { 255 } else { 0 }])
            });
            let Some(traced) = trace_outer_ring(&mask) else {
                continue;
            };
            let ring = simplify_ring(traced, config.simplify_tolerance, config.minimum_corner_angle);
            if ring.len() < 3 {
                continue;
            }
            let mut polygon = Polygon::new(ring, pixel_count);
            // a flat primary still goes on so scaling can reject it
            if !polygons.is_empty() && !(polygon.area() > 0.0) {
                debug!("Dropping flat {} pixel component", pixel_count);
                continue;
            }
            polygon.orient_ccw();
            polygons.push(polygon);
        }

        if polygons.is_empty() {
            return Err(SectionError::NoPolygonFound {
                minimum_connected_pixels: config.minimum_connected_pixels,
                largest_component,
            });
        }
        Ok(polygons)
    }
}

/// Outer border of the single component in `mask`
fn trace_outer_ring(mask: &GrayImage) -> Option<Vec<[f64; 2]>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .max_by_key(|contour| contour.points.len())
        .map(|contour| {
            contour
                .points
                .iter()
                .map(|p| [f64::from(p.x), f64::from(p.y)])
                .collect()
        })
}

/// Clean, simplify and corner-merge a traced ring.
///
/// Falls back to the cleaned ring when simplification collapses it.
pub fn simplify_ring(traced: Vec<[f64; 2]>, tolerance: f64, minimum_corner_angle: f64) -> Vec<[f64; 2]> {
    let cleaned = remove_spikes(traced);
    let mut ring = if tolerance > 0.0 {
        douglas_peucker(&cleaned, tolerance)
    } else {
        cleaned.clone()
    };
    if ring.len() < 3 {
        ring = cleaned;
    }
    merge_corners(&mut ring, minimum_corner_angle);
    ring
}

/// Drop repeated vertices and back-tracking spurs (`a, b, a`)
fn remove_spikes(mut ring: Vec<[f64; 2]>) -> Vec<[f64; 2]> {
    loop {
        let before = ring.len();
        ring.dedup();
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        // a there-and-back path stops at a, b, c, b so it still reaches the scaler
        let n = ring.len();
        if n > 4 {
            if let Some(i) = (0..n).find(|&i| ring[(i + n - 1) % n] == ring[(i + 1) % n]) {
                ring.remove(i);
            }
        }
        if ring.len() == before {
            return ring;
        }
    }
}

fn douglas_peucker(ring: &[[f64; 2]], tolerance: f64) -> Vec<[f64; 2]> {
    use geo::Simplify;

    let mut coords: Vec<Coord<f64>> = ring.iter().map(|&[x, y]| Coord { x, y }).collect();
    if let Some(&first) = coords.first() {
        coords.push(first);
    }
    let simplified = LineString::new(coords).simplify(&tolerance);
    let mut out: Vec<[f64; 2]> = simplified.coords().map(|c| [c.x, c.y]).collect();
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

/// Remove the straightest vertex until every turn reaches `minimum_angle` degrees
fn merge_corners(ring: &mut Vec<[f64; 2]>, minimum_angle: f64) {
    while ring.len() > 3 {
        let n = ring.len();
        let straightest = (0..n)
            .map(|i| (i, turning_angle(ring[(i + n - 1) % n], ring[i], ring[(i + 1) % n])))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match straightest {
            Some((i, angle)) if angle < minimum_angle => {
                ring.remove(i);
            }
            _ => break,
        }
    }
}

/// Change of heading at `current`, in degrees (0 = straight on, 180 = reversal)
fn turning_angle(previous: [f64; 2], current: [f64; 2], next: [f64; 2]) -> f64 {
    let incoming = (current[1] - previous[1]).atan2(current[0] - previous[0]);
    let outgoing = (next[1] - current[1]).atan2(next[0] - current[0]);
    if current == previous || current == next {
        return 0.0;
    }
    let mut turn = outgoing - incoming;
    while turn > std::f64::consts::PI {
        turn -= std::f64::consts::TAU;
    }
    while turn < -std::f64::consts::PI {
        turn += std::f64::consts::TAU;
    }
    turn.abs().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::skeleton::boundary_band;

    fn draw_rect(image: &mut GrayImage, rect: (u32, u32, u32, u32)) {
        let (x0, y0, w, h) = rect;
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                image.put_pixel(x, y, Luma([255]));
            }
        }
    }

    fn skeleton_of(rects: &[(u32, u32, u32, u32)]) -> GrayImage {
        let mut image = GrayImage::new(200, 120);
        for &rect in rects {
            draw_rect(&mut image, rect);
        }
        boundary_band(&image)
    }

    #[test]
    fn test_rectangle_becomes_four_corners() {
        let skeleton = skeleton_of(&[(10, 10, 40, 20)]);
        let polygons = SkeletonPolygonizer
            .extract_polygons(&skeleton, &SectionConfig::default())
            .expect("Should find the rectangle");

        assert_eq!(polygons.len(), 1);
        let polygon = &polygons[0];
        assert_eq!(polygon.vertices.len(), 4);
        assert_eq!(polygon.pixel_count, 2 * 40 + 2 * 20 - 4);
        let bbox = polygon.bounding_box().expect("bbox");
        assert_eq!((bbox.min, bbox.max), ([10.0, 10.0], [49.0, 29.0]));
        assert!(polygon.signed_area() > 0.0);
    }

    #[test]
    fn test_polygons_ordered_by_component_size() {
        let skeleton = skeleton_of(&[(10, 10, 20, 20), (60, 10, 100, 80)]);
        let polygons = SkeletonPolygonizer
            .extract_polygons(&skeleton, &SectionConfig::default())
            .expect("Should find both rectangles");

        assert_eq!(polygons.len(), 2);
        assert!(polygons[0].pixel_count > polygons[1].pixel_count);
        assert!(polygons[0].area() > polygons[1].area());
    }

    #[test]
    fn test_small_components_are_noise() {
        let skeleton = skeleton_of(&[(10, 10, 40, 20), (100, 100, 3, 3), (150, 20, 2, 2)]);
        let polygons = SkeletonPolygonizer
            .extract_polygons(&skeleton, &SectionConfig::default())
            .expect("Should find the rectangle");
        assert_eq!(polygons.len(), 1);
    }

    #[test]
    fn test_threshold_above_every_component_finds_nothing() {
        let skeleton = skeleton_of(&[(10, 10, 40, 20)]);
        let config = SectionConfig::default().with_minimum_connected_pixels(10_000);
        let err = SkeletonPolygonizer
            .extract_polygons(&skeleton, &config)
            .expect_err("no component is large enough");
        match err {
            SectionError::NoPolygonFound { largest_component, .. } => {
                assert_eq!(largest_component, 116)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_line_keeps_a_zero_area_ring() {
        let mut skeleton = GrayImage::new(40, 100);
        for y in 10..90 {
            skeleton.put_pixel(20, y, Luma([255]));
        }
        let polygons = SkeletonPolygonizer
            .extract_polygons(&skeleton, &SectionConfig::default())
            .expect("the line is large enough");
        assert_eq!(polygons.len(), 1);
        assert!(polygons[0].vertices.len() >= 3);
        assert_eq!(polygons[0].area(), 0.0);
        assert!(polygons[0].vertices.iter().all(|v| v[0] == 20.0));
    }

    #[test]
    fn test_flat_secondary_component_is_dropped() {
        let mut skeleton = skeleton_of(&[(10, 10, 40, 20)]);
        for y in 40..100 {
            skeleton.put_pixel(150, y, Luma([255]));
        }
        let polygons = SkeletonPolygonizer
            .extract_polygons(&skeleton, &SectionConfig::default())
            .expect("Should find the rectangle");

        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].vertices.len(), 4);
        assert!(polygons[0].area() > 0.0);
    }

    #[test]
    fn test_merge_corners_drops_shallow_turns() {
        let mut ring = vec![
            [0.0, 0.0],
            [5.0, 0.2],
            [10.0, 0.0],
            [10.0, 10.0],
            [5.0, 10.0],
            [0.0, 10.0],
        ];
        merge_corners(&mut ring, 15.0);
        assert_eq!(ring, vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]);
    }

    #[test]
    fn test_merge_corners_keeps_three_vertices() {
        let mut ring = vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        merge_corners(&mut ring, 15.0);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_remove_spikes() {
        let ring = vec![[0.0, 0.0], [4.0, 0.0], [6.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]];
        assert_eq!(
            remove_spikes(ring),
            vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]]
        );
    }

    #[test]
    fn test_turning_angle() {
        assert!(turning_angle([0.0, 0.0], [1.0, 0.0], [2.0, 0.0]).abs() < 1e-12);
        assert!((turning_angle([0.0, 0.0], [1.0, 0.0], [1.0, 1.0]) - 90.0).abs() < 1e-12);
        assert!((turning_angle([0.0, 0.0], [1.0, 0.0], [0.0, 0.0]) - 180.0).abs() < 1e-12);
    }
}
