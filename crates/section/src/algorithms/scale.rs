use tracing::debug;

use crate::{
    error::{Result, SectionError},
    types::{BoundingBox, Polygon, ScaledPolygon},
};

/// Pixel-space frame a set of polygons is scaled in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFrame {
    pub origin: BoundingBox,
    pub sx: f64,
    pub sy: f64,
}

impl ScaleFrame {
    /// Frame mapping `polygon`'s pixel bounding box onto `[0, bbox_x] x [0, bbox_y]`
    pub fn fit(polygon: &Polygon, bbox_x: f64, bbox_y: f64) -> Result<Self> {
        let origin = polygon
            .bounding_box()
            .ok_or_else(|| SectionError::DegenerateGeometry("polygon has no vertices".into()))?;
        let (width, height) = (origin.width(), origin.height());
        if width <= 0.0 || height <= 0.0 {
            return Err(SectionError::DegenerateGeometry(format!(
                "pixel bounding box is {width} x {height}"
            )));
        }
        Ok(Self {
            origin,
            sx: bbox_x / width,
            sy: bbox_y / height,
        })
    }

    /// Image rows grow downwards, so y is flipped about the frame's top edge
    pub fn apply(&self, polygon: &Polygon) -> ScaledPolygon {
        let vertices = polygon
            .vertices
            .iter()
            .map(|&[x, y]| {
                [
                    (x - self.origin.min[0]) * self.sx,
                    (self.origin.max[1] - y) * self.sy,
                ]
            })
            .collect();
        let mut scaled = Polygon::new(vertices, polygon.pixel_count);
        scaled.orient_ccw();
        ScaledPolygon {
            polygon: scaled,
            scale: [self.sx, self.sy],
        }
    }
}

/// Scale one polygon to exactly fill the target box
pub fn scale_polygon(polygon: &Polygon, bbox_x: f64, bbox_y: f64) -> Result<ScaledPolygon> {
    let frame = ScaleFrame::fit(polygon, bbox_x, bbox_y)?;
    let scaled = frame.apply(polygon);
    ensure_area(&scaled, 0)?;
    Ok(scaled)
}

/// Scale a polygon set in the frame of the first polygon, keeping relative placement.
///
/// Only the primary polygon has to enclose area; flat secondary rings are dropped.
pub fn scale_polygons(polygons: &[Polygon], bbox_x: f64, bbox_y: f64) -> Result<Vec<ScaledPolygon>> {
    let (primary, rest) = polygons
        .split_first()
        .ok_or_else(|| SectionError::DegenerateGeometry("no polygon to scale".into()))?;
    let frame = ScaleFrame::fit(primary, bbox_x, bbox_y)?;
    let scaled_primary = frame.apply(primary);
    ensure_area(&scaled_primary, 0)?;

    let mut scaled = Vec::with_capacity(polygons.len());
    scaled.push(scaled_primary);
    for (i, polygon) in rest.iter().enumerate() {
        let candidate = frame.apply(polygon);
        match ensure_area(&candidate, i + 1) {
            Ok(()) => scaled.push(candidate),
            Err(e) => debug!("Skipping secondary ring: {}", e),
        }
    }
    Ok(scaled)
}

fn ensure_area(scaled: &ScaledPolygon, index: usize) -> Result<()> {
    let area = scaled.polygon.area();
    if area > 0.0 && area.is_finite() {
        Ok(())
    } else {
        Err(SectionError::DegenerateGeometry(format!(
            "polygon {index} has zero area after scaling"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f64, y0: f64, w: f64, h: f64) -> Polygon {
        Polygon::new(
            vec![[x0, y0], [x0 + w, y0], [x0 + w, y0 + h], [x0, y0 + h]],
            0,
        )
    }

    #[test]
    fn test_scale_fills_target_box() {
        let scaled = scale_polygon(&rect(10.0, 10.0, 39.0, 19.0), 40.0, 20.0).expect("Should scale");
        let bbox = scaled.polygon.bounding_box().expect("bbox");
        assert_eq!(bbox.min, [0.0, 0.0]);
        assert!((bbox.max[0] - 40.0).abs() < 1e-9 && (bbox.max[1] - 20.0).abs() < 1e-9);
        assert!((scaled.polygon.area() - 800.0).abs() < 1e-9);
        assert_eq!(scaled.scale, [40.0 / 39.0, 20.0 / 19.0]);
        assert!(scaled.polygon.signed_area() > 0.0);
    }

    #[test]
    fn test_aspect_ratio_is_not_preserved() {
        let scaled = scale_polygon(&rect(0.0, 0.0, 10.0, 10.0), 100.0, 25.0).expect("Should scale");
        let bbox = scaled.polygon.bounding_box().expect("bbox");
        assert_eq!((bbox.width(), bbox.height()), (100.0, 25.0));
    }

    #[test]
    fn test_y_axis_points_up() {
        // a triangle whose apex is at the top of the image
        let polygon = Polygon::new(vec![[0.0, 10.0], [10.0, 10.0], [5.0, 0.0]], 0);
        let scaled = scale_polygon(&polygon, 10.0, 10.0).expect("Should scale");
        assert!(scaled.polygon.vertices.contains(&[5.0, 10.0]));
    }

    #[test]
    fn test_zero_width_is_degenerate() {
        let line = Polygon::new(vec![[5.0, 0.0], [5.0, 30.0], [5.0, 12.0]], 30);
        let err = scale_polygon(&line, 100.0, 100.0).expect_err("zero width");
        assert!(matches!(err, SectionError::DegenerateGeometry(_)));
    }

    #[test]
    fn test_collinear_diagonal_is_degenerate() {
        let line = Polygon::new(vec![[0.0, 0.0], [10.0, 10.0], [5.0, 5.0]], 30);
        let err = scale_polygon(&line, 100.0, 100.0).expect_err("zero area");
        assert!(matches!(err, SectionError::DegenerateGeometry(_)));
    }

    #[test]
    fn test_flat_secondary_ring_is_skipped() {
        let outer = rect(0.0, 0.0, 20.0, 20.0);
        let stroke = Polygon::new(vec![[30.0, 0.0], [30.0, 40.0], [30.0, 20.0]], 60);
        let scaled = scale_polygons(&[outer, stroke], 40.0, 20.0).expect("Should scale");
        assert_eq!(scaled.len(), 1);
        assert!((scaled[0].polygon.area() - 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_primary_is_degenerate_in_a_set() {
        let stroke = Polygon::new(vec![[0.0, 0.0], [10.0, 10.0], [5.0, 5.0]], 60);
        let err = scale_polygons(&[stroke, rect(0.0, 0.0, 5.0, 5.0)], 40.0, 20.0).expect_err("flat primary");
        assert!(matches!(err, SectionError::DegenerateGeometry(_)));
    }

    #[test]
    fn test_set_shares_primary_frame() {
        let outer = rect(0.0, 0.0, 20.0, 20.0);
        let inner = rect(5.0, 5.0, 10.0, 10.0);
        let scaled = scale_polygons(&[outer, inner], 100.0, 100.0).expect("Should scale");
        let inner_bbox = scaled[1].polygon.bounding_box().expect("bbox");
        assert_eq!((inner_bbox.min, inner_bbox.max), ([25.0, 25.0], [75.0, 75.0]));
    }
}
