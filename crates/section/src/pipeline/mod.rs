pub mod builder;

use image::{DynamicImage, GrayImage};
use tracing::debug;

use crate::{
    algorithms::{compose, scale_polygons},
    config::SectionConfig,
    error::{Result, SectionError},
    traits::{ImageDecoder, PolygonExtractor, PropertyIntegrator, SkeletonExtractor},
    types::{Mesh, MeshSummary, Polygon, ScaledPolygon, Section, SectionProperties},
};

/// The image-to-properties stage chain, minus meshing.
///
/// Meshing is left to the orchestrator, which owns the lock around the
/// backend. Every stage here is safe to run concurrently.
pub struct SectionPipeline {
    decoder: Box<dyn ImageDecoder>,
    skeleton_extractor: Box<dyn SkeletonExtractor>,
    polygon_extractor: Box<dyn PolygonExtractor>,
    integrator: Box<dyn PropertyIntegrator>,
}

impl SectionPipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    pub fn new(
        decoder: Box<dyn ImageDecoder>,
        skeleton_extractor: Box<dyn SkeletonExtractor>,
        polygon_extractor: Box<dyn PolygonExtractor>,
        integrator: Box<dyn PropertyIntegrator>,
    ) -> Self {
        Self {
            decoder,
            skeleton_extractor,
            polygon_extractor,
            integrator,
        }
    }

    pub fn decode(&self, payload: &[u8]) -> Result<DynamicImage> {
        self.decoder.decode(payload)
    }

    pub fn skeletonize(&self, image: &DynamicImage, config: &SectionConfig) -> Result<GrayImage> {
        self.skeleton_extractor.extract_skeleton(image, config)
    }

    pub fn polygonize(&self, skeleton: &GrayImage, config: &SectionConfig) -> Result<Vec<Polygon>> {
        self.polygon_extractor.extract_polygons(skeleton, config)
    }

    /// Scale into physical units and compose the section that gets meshed
    pub fn scale(&self, polygons: &[Polygon], config: &SectionConfig) -> Result<(Vec<ScaledPolygon>, Section)> {
        let scaled = scale_polygons(polygons, config.bbox_x, config.bbox_y)?;
        let section = compose(&scaled, config.composition)?;
        Ok((scaled, section))
    }

    /// Integrate the mesh about the section centroid.
    ///
    /// The meshed area has to agree with the section area within
    /// `config.area_tolerance`.
    pub fn integrate(&self, mesh: &Mesh, section: &Section, config: &SectionConfig) -> Result<SectionProperties> {
        let area = section.area();
        let centroid = section
            .centroid()
            .ok_or_else(|| SectionError::Integration("section has no centroid".into()))?;

        let integrated = self.integrator.integrate(mesh, centroid)?;
        let deviation = (integrated.area - area).abs() / area;
        debug!(
            "Mesh area {} vs section area {} (relative deviation {:.2e})",
            integrated.area, area, deviation
        );
        if !(deviation <= config.area_tolerance) {
            return Err(SectionError::Integration(format!(
                "meshed area {} deviates from section area {} by more than {}",
                integrated.area, area, config.area_tolerance
            )));
        }

        Ok(SectionProperties {
            area,
            centroid,
            ix: integrated.ix,
            iy: integrated.iy,
            ixy: integrated.ixy,
            mesh: MeshSummary {
                nodes: mesh.nodes.len(),
                elements: mesh.elements.len(),
                area: integrated.area,
            },
        })
    }
}

impl Default for SectionPipeline {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Element;
    use image::Luma;

    fn rectangle_image() -> DynamicImage {
        let mut image = GrayImage::new(80, 60);
        for y in 10..30 {
            for x in 10..50 {
                image.put_pixel(x, y, Luma([255]));
            }
        }
        DynamicImage::ImageLuma8(image)
    }

    #[test]
    fn test_pre_mesh_stages() {
        let pipeline = SectionPipeline::default();
        let config = SectionConfig::default().with_bbox(40.0, 20.0);
        let image = rectangle_image();

        let skeleton = pipeline.skeletonize(&image, &config).expect("Should skeletonize");
        let polygons = pipeline.polygonize(&skeleton, &config).expect("Should polygonize");
        let (scaled, section) = pipeline.scale(&polygons, &config).expect("Should scale");

        assert_eq!(scaled.len(), 1);
        assert!((section.area() - 800.0).abs() < 1e-9);
        let [cx, cy] = section.centroid().expect("centroid");
        assert!((cx - 20.0).abs() < 1e-9 && (cy - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_integrate_rejects_area_mismatch() {
        let square = vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let section = Section { shapes: vec![crate::types::SectionShape::solid(square)] };
        // only half the square is meshed
        let mesh = Mesh {
            nodes: vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [10.0, 10.0, 0.0]],
            elements: vec![Element::Triangle { nodes: [0, 1, 2] }],
            mesh_size: 10.0,
            extrusion: None,
        };
        let err = SectionPipeline::default()
            .integrate(&mesh, &section, &SectionConfig::default())
            .expect_err("half the area is missing");
        assert!(matches!(err, SectionError::Integration(_)));
    }
}
