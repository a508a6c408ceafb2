//! Which parts of which pages are OCR'd in each extraction mode.
//!
//! Crops are fractions of the rendered page so they hold at any DPI.
//!
//! Chinese patent front pages carry a bibliographic banner across the top
//! ~16.5 % and two independent text columns below it; OCR'ing the columns
//! separately keeps Tesseract from interleaving their lines. The
//! continuation page (page 2) has no banner.

use crate::config::ExtractionMode;

/// A rectangle in page-relative coordinates, `0.0..=1.0` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl CropBox {
    pub const FULL: CropBox = CropBox {
        left: 0.0,
        top: 0.0,
        right: 1.0,
        bottom: 1.0,
    };

    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Pixel rectangle `(x, y, width, height)` inside a `width × height`
    /// bitmap. Always at least 1×1 and never outside the bitmap.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let px = |f: f32, max: u32| ((f.clamp(0.0, 1.0) * max as f32).round() as u32).min(max);
        let x0 = px(self.left, width).min(width.saturating_sub(1));
        let y0 = px(self.top, height).min(height.saturating_sub(1));
        let x1 = px(self.right, width).max(x0 + 1);
        let y1 = px(self.bottom, height).max(y0 + 1);
        (x0, y0, x1 - x0, y1 - y0)
    }
}

/// One named crop of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSpec {
    /// Region id; in the front-page modes also the result field name.
    pub id: String,
    /// Zero-based page index.
    pub page: usize,
    pub crop: CropBox,
}

impl RegionSpec {
    pub fn new(id: impl Into<String>, page: usize, crop: CropBox) -> Self {
        Self {
            id: id.into(),
            page,
            crop,
        }
    }
}

/// Regions to extract from a document.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionPlan {
    /// Every page, uncropped, with region id `page-<n>` (1-based).
    AllPages,
    /// A fixed list of page crops; a missing page is an error.
    Fixed(Vec<RegionSpec>),
}

const BANNER: f32 = 0.165;

impl RegionPlan {
    pub fn for_mode(mode: ExtractionMode) -> Self {
        let front = |suffix: &str| {
            [
                RegionSpec::new(format!("left{suffix}"), 0, CropBox::new(0.0, BANNER, 0.5, 1.0)),
                RegionSpec::new(format!("right{suffix}"), 0, CropBox::new(0.5, BANNER, 1.0, 1.0)),
            ]
        };
        match mode {
            ExtractionMode::Description => RegionPlan::AllPages,
            ExtractionMode::FrontPage => RegionPlan::Fixed(front("").to_vec()),
            ExtractionMode::FrontPageContinued => {
                let mut specs = front("1").to_vec();
                specs.push(RegionSpec::new("left2", 1, CropBox::new(0.0, 0.0, 0.5, 1.0)));
                specs.push(RegionSpec::new("right2", 1, CropBox::new(0.5, 0.0, 1.0, 1.0)));
                RegionPlan::Fixed(specs)
            }
        }
    }

    /// Region id used for whole pages in [`RegionPlan::AllPages`].
    pub fn page_region_id(page: usize) -> String {
        format!("page-{}", page + 1)
    }
}
