use crate::{
    algorithms::{BoundarySkeletonizer, SkeletonPolygonizer, TriangleIntegrator, UploadDecoder, ZhangSuenThinning},
    pipeline::SectionPipeline,
    traits::{ImageDecoder, PolygonExtractor, PropertyIntegrator, SkeletonExtractor},
};

/// Builder for section pipelines with a fluent API
#[derive(Default)]
pub struct PipelineBuilder {
    decoder: Option<Box<dyn ImageDecoder>>,
    skeleton_extractor: Option<Box<dyn SkeletonExtractor>>,
    polygon_extractor: Option<Box<dyn PolygonExtractor>>,
    integrator: Option<Box<dyn PropertyIntegrator>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the upload decoder (replaces any existing one)
    pub fn set_decoder<D>(mut self, decoder: D) -> Self
    where
        D: ImageDecoder + 'static,
    {
        self.decoder = Some(Box::new(decoder));
        self
    }

    /// Set the skeleton extractor (replaces any existing one)
    pub fn set_skeleton_extractor<S>(mut self, extractor: S) -> Self
    where
        S: SkeletonExtractor + 'static,
    {
        self.skeleton_extractor = Some(Box::new(extractor));
        self
    }

    /// Set the polygon extractor (replaces any existing one)
    pub fn set_polygon_extractor<P>(mut self, extractor: P) -> Self
    where
        P: PolygonExtractor + 'static,
    {
        self.polygon_extractor = Some(Box::new(extractor));
        self
    }

    /// Set the property integrator (replaces any existing one)
    pub fn set_integrator<I>(mut self, integrator: I) -> Self
    where
        I: PropertyIntegrator + 'static,
    {
        self.integrator = Some(Box::new(integrator));
        self
    }

    /// Skeletonize by thinning the whole foreground, for stroke drawings
    pub fn with_centerline_skeleton(self) -> Self {
        self.set_skeleton_extractor(ZhangSuenThinning)
    }

    /// Build the pipeline with default components if not specified
    pub fn build(self) -> SectionPipeline {
        SectionPipeline::new(
            self.decoder.unwrap_or_else(|| Box::new(UploadDecoder)),
            self.skeleton_extractor.unwrap_or_else(|| Box::new(BoundarySkeletonizer)),
            self.polygon_extractor.unwrap_or_else(|| Box::new(SkeletonPolygonizer)),
            self.integrator.unwrap_or_else(|| Box::new(TriangleIntegrator)),
        )
    }
}
