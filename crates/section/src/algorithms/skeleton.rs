use image::{imageops, DynamicImage, GrayImage, Luma};
use imageproc::{contrast::otsu_level, distance_transform::Norm, morphology::erode};
use tracing::debug;

use crate::{
    config::{Foreground, SectionConfig, ThresholdPolicy},
    error::{Result, SectionError},
    traits::SkeletonExtractor,
};

const SET: Luma<u8> = Luma([255]);
const CLEAR: Luma<u8> = Luma([0]);

/// Split an image into foreground (255) and background (0)
pub fn binarize(image: &DynamicImage, threshold: ThresholdPolicy, foreground: Foreground) -> GrayImage {
    let luma = image.to_luma8();
    let level = match threshold {
        ThresholdPolicy::Fixed(level) => level,
        ThresholdPolicy::Otsu => otsu_level(&luma),
    };
    debug!("Binarizing at level {} ({:?} foreground)", level, foreground);

    GrayImage::from_fn(luma.width(), luma.height(), |x, y| {
        let value = luma.get_pixel(x, y)[0];
        let is_foreground = match foreground {
            Foreground::Bright => value > level,
            Foreground::Dark => value <= level,
        };
        if is_foreground { SET } else { CLEAR }
    })
}

/// Foreground pixels that touch the background through a 4-neighbour.
///
/// Pixels outside the image count as background.
pub fn boundary_band(binary: &GrayImage) -> GrayImage {
    let (width, height) = binary.dimensions();
    let padded = pad(binary);
    let eroded = erode(&padded, Norm::L1, 1);
    let band = GrayImage::from_fn(width + 2, height + 2, |x, y| {
        if padded.get_pixel(x, y)[0] > 0 && eroded.get_pixel(x, y)[0] == 0 {
            SET
        } else {
            CLEAR
        }
    });
    imageops::crop_imm(&band, 1, 1, width, height).to_image()
}

/// Zhang-Suen thinning to a one pixel wide, 8-connected skeleton
pub fn thin(binary: &GrayImage) -> GrayImage {
    let (width, height) = binary.dimensions();
    let mut image = pad(binary);

    loop {
        let mut changed = false;
        for first_pass in [true, false] {
            let mut deletable = Vec::new();
            for y in 1..=height {
                for x in 1..=width {
                    if image.get_pixel(x, y)[0] == 0 {
                        continue;
                    }
                    let p = neighbours(&image, x, y);
                    let set = p.iter().filter(|&&v| v).count();
                    let transitions = (0..8).filter(|&i| !p[i] && p[(i + 1) % 8]).count();
                    if !(2..=6).contains(&set) || transitions != 1 {
                        continue;
                    }
                    // p[0]=N, p[2]=E, p[4]=S, p[6]=W
                    let removable = if first_pass {
                        !(p[0] && p[2] && p[4]) && !(p[2] && p[4] && p[6])
                    } else {
                        !(p[0] && p[2] && p[6]) && !(p[0] && p[4] && p[6])
                    };
                    if removable {
                        deletable.push((x, y));
                    }
                }
            }
            changed |= !deletable.is_empty();
            for (x, y) in deletable {
                image.put_pixel(x, y, CLEAR);
            }
        }
        if !changed {
            break;
        }
    }

    imageops::crop_imm(&image, 1, 1, width, height).to_image()
}

/// Clockwise from north: N, NE, E, SE, S, SW, W, NW
fn neighbours(image: &GrayImage, x: u32, y: u32) -> [bool; 8] {
    let at = |dx: i64, dy: i64| {
        let px = (x as i64 + dx) as u32;
        let py = (y as i64 + dy) as u32;
        image.get_pixel(px, py)[0] > 0
    };
    [
        at(0, -1),
        at(1, -1),
        at(1, 0),
        at(1, 1),
        at(0, 1),
        at(-1, 1),
        at(-1, 0),
        at(-1, -1),
    ]
}

fn pad(image: &GrayImage) -> GrayImage {
    let mut padded = GrayImage::new(image.width() + 2, image.height() + 2);
    imageops::replace(&mut padded, image, 1, 1);
    padded
}

/// Skeleton of the section outline: binarize, keep the boundary band, thin it.
///
/// Filled silhouettes reduce to their outline; stroke drawings reduce to the
/// two edges of each stroke.
#[derive(Debug, Clone, Default)]
pub struct BoundarySkeletonizer;

impl SkeletonExtractor for BoundarySkeletonizer {
    fn extract_skeleton(&self, image: &DynamicImage, config: &SectionConfig) -> Result<GrayImage> {
        let binary = binarize(image, config.threshold, config.foreground);
        let foreground = binary.pixels().filter(|p| p[0] > 0).count();
        if foreground == 0 {
            return Err(SectionError::EmptyImage);
        }
        debug!("{} foreground pixels", foreground);
        Ok(thin(&boundary_band(&binary)))
    }
}

/// Skeleton by plain thinning of the foreground.
///
/// Suited to line drawings where the section outline is a stroke.
#[derive(Debug, Clone, Default)]
pub struct ZhangSuenThinning;

impl SkeletonExtractor for ZhangSuenThinning {
    fn extract_skeleton(&self, image: &DynamicImage, config: &SectionConfig) -> Result<GrayImage> {
        let binary = binarize(image, config.threshold, config.foreground);
        if binary.pixels().all(|p| p[0] == 0) {
            return Err(SectionError::EmptyImage);
        }
        Ok(thin(&binary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_rect(width: u32, height: u32, rect: (u32, u32, u32, u32)) -> GrayImage {
        let (x0, y0, w, h) = rect;
        GrayImage::from_fn(width, height, |x, y| {
            if (x0..x0 + w).contains(&x) && (y0..y0 + h).contains(&y) { SET } else { CLEAR }
        })
    }

    fn count(image: &GrayImage) -> usize {
        image.pixels().filter(|p| p[0] > 0).count()
    }

    #[test]
    fn test_binarize_polarity() {
        let image = DynamicImage::ImageLuma8(filled_rect(10, 10, (2, 2, 3, 3)));
        let bright = binarize(&image, ThresholdPolicy::Fixed(128), Foreground::Bright);
        let dark = binarize(&image, ThresholdPolicy::Fixed(128), Foreground::Dark);
        assert_eq!(count(&bright), 9);
        assert_eq!(count(&dark), 91);
    }

    #[test]
    fn test_boundary_band_of_rectangle_is_its_perimeter() {
        let band = boundary_band(&filled_rect(60, 40, (10, 10, 40, 20)));
        assert_eq!(count(&band), 2 * 40 + 2 * 20 - 4);
        assert_eq!(band.get_pixel(10, 10)[0], 255);
        assert_eq!(band.get_pixel(20, 20)[0], 0);
    }

    #[test]
    fn test_boundary_band_at_image_edge() {
        let band = boundary_band(&filled_rect(10, 10, (0, 0, 10, 10)));
        assert_eq!(count(&band), 36);
    }

    #[test]
    fn test_thinning_keeps_one_pixel_ring() {
        let band = boundary_band(&filled_rect(60, 40, (10, 10, 40, 20)));
        let thinned = thin(&band);
        assert_eq!(thinned, band);
    }

    #[test]
    fn test_thinning_reduces_thick_bar() {
        let thinned = thin(&filled_rect(40, 20, (5, 5, 30, 7)));
        assert!(count(&thinned) > 0);
        assert!(count(&thinned) < 30 * 7 / 2);
        // away from the ends the bar reduces to a single row
        for x in 12..28 {
            let column = (0..20).filter(|&y| thinned.get_pixel(x, y)[0] > 0).count();
            assert!(column <= 1, "column {x} has {column} pixels");
        }
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let image = DynamicImage::ImageLuma8(GrayImage::new(32, 32));
        let err = BoundarySkeletonizer
            .extract_skeleton(&image, &SectionConfig::default())
            .expect_err("nothing to skeletonize");
        assert!(matches!(err, SectionError::EmptyImage));
    }

    #[test]
    fn test_skeleton_has_source_dimensions() {
        let image = DynamicImage::ImageLuma8(filled_rect(64, 48, (8, 8, 40, 20)));
        let skeleton = BoundarySkeletonizer
            .extract_skeleton(&image, &SectionConfig::default())
            .expect("Should skeletonize");
        assert_eq!(skeleton.dimensions(), (64, 48));
    }
}
