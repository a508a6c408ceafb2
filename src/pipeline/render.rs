//! PDF rasterisation: render pages via pdfium and cut them into OCR regions.
//!
//! pdfium is not async-safe, so [`RegionExtractor::extract_each`] is a
//! blocking call; the document pipeline runs it inside `spawn_blocking` and
//! receives regions one page at a time, so only the page being rendered and
//! the page being OCR'd are held in memory.
//!
//! `max_rendered_pixels` caps the longest edge regardless of physical page
//! size. Most patent scans are A4, but the occasional A0 drawing sheet at
//! 400 DPI would otherwise need a 13,000 × 18,000 px bitmap.

use crate::config::BatchConfig;
use crate::error::{BatchError, ExtractionError};
use crate::pipeline::encode::encode_png;
use crate::pipeline::regions::{CropBox, RegionPlan, RegionSpec};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One encoded image region, ready for OCR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRegion {
    /// `left`, `right2`, `page-3`, …
    pub id: String,
    /// Zero-based source page.
    pub page_index: usize,
    /// Grayscale PNG.
    pub png: Vec<u8>,
}

/// Turns a source document into ordered image regions.
pub trait RegionExtractor: Send + Sync {
    /// Blocking. Hands regions to `emit` one at a time in page order and
    /// stops rendering as soon as `emit` returns [`ControlFlow::Break`].
    fn extract_each(
        &self,
        source: &Path,
        emit: &mut dyn FnMut(ImageRegion) -> ControlFlow<()>,
    ) -> Result<(), ExtractionError>;

    /// Blocking. Every region of the document, in page order.
    fn extract(&self, source: &Path) -> Result<Vec<ImageRegion>, ExtractionError> {
        let mut out = Vec::new();
        self.extract_each(source, &mut |region| {
            out.push(region);
            ControlFlow::Continue(())
        })?;
        Ok(out)
    }
}

/// [`RegionExtractor`] backed by pdfium-render.
#[derive(Debug, Clone)]
pub struct PdfiumExtractor {
    plan: RegionPlan,
    dpi: u32,
    max_pixels: u32,
    lib_path: Option<PathBuf>,
}

impl PdfiumExtractor {
    pub fn new(plan: RegionPlan, dpi: u32, max_pixels: u32, lib_path: Option<PathBuf>) -> Self {
        Self {
            plan,
            dpi,
            max_pixels,
            lib_path,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            RegionPlan::for_mode(config.mode),
            config.effective_dpi(),
            config.max_rendered_pixels,
            config.pdfium_lib_path.clone(),
        )
    }

    /// Bind pdfium once so a missing library fails the run up front instead
    /// of failing every document.
    pub fn preflight(&self) -> Result<(), BatchError> {
        bind(self.lib_path.as_deref())
            .map(|_| ())
            .map_err(|e| BatchError::PdfiumBindingFailed(format!("{:?}", e)))
    }

    fn render_config(&self) -> PdfRenderConfig {
        PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32)
    }
}

/// Bind to libpdfium in `lib` (a directory or the library file itself), or
/// the system library when `None`.
fn bind(lib: Option<&Path>) -> Result<Pdfium, PdfiumError> {
    let bindings = match lib {
        Some(dir) if dir.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))?
        }
        Some(file) => Pdfium::bind_to_library(file)?,
        None => Pdfium::bind_to_system_library()?,
    };
    Ok(Pdfium::new(bindings))
}

impl RegionExtractor for PdfiumExtractor {
    fn extract_each(
        &self,
        source: &Path,
        emit: &mut dyn FnMut(ImageRegion) -> ControlFlow<()>,
    ) -> Result<(), ExtractionError> {
        let pdfium = bind(self.lib_path.as_deref())
            .map_err(|e| ExtractionError::Binding(format!("{:?}", e)))?;

        let document = pdfium
            .load_pdf_from_file(source, None)
            .map_err(|e| ExtractionError::CorruptPdf {
                path: source.to_path_buf(),
                detail: format!("{:?}", e),
            })?;
        let pages = document.pages();
        let total_pages = pages.len() as usize;
        debug!("PDF loaded: {} pages ({})", total_pages, source.display());

        let render_config = self.render_config();
        let render = |idx: usize| -> Result<DynamicImage, ExtractionError> {
            let page = pages
                .get(idx as u16)
                .map_err(|e| ExtractionError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ExtractionError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            Ok(image)
        };

        let mut emitted = 0usize;
        match &self.plan {
            RegionPlan::AllPages => {
                for idx in 0..total_pages {
                    let image = render(idx)?;
                    let spec = RegionSpec::new(RegionPlan::page_region_id(idx), idx, CropBox::FULL);
                    let region = crop_and_encode(&image, &spec)?;
                    drop(image);
                    emitted += 1;
                    if emit(region).is_break() {
                        debug!(doc = %source.display(), pages = emitted, "Rendering stopped early");
                        break;
                    }
                }
            }
            RegionPlan::Fixed(specs) => {
                if let Some(spec) = specs.iter().find(|s| s.page >= total_pages) {
                    return Err(ExtractionError::PageOutOfRange {
                        page: spec.page + 1,
                        total: total_pages,
                    });
                }
                let mut current: Option<(usize, DynamicImage)> = None;
                for spec in specs {
                    if current.as_ref().map(|(p, _)| *p) != Some(spec.page) {
                        current = Some((spec.page, render(spec.page)?));
                    }
                    let Some((_, image)) = &current else {
                        continue;
                    };
                    emitted += 1;
                    if emit(crop_and_encode(image, spec)?).is_break() {
                        break;
                    }
                }
            }
        }
        info!("Extracted {} regions from {}", emitted, source.display());
        Ok(())
    }
}

fn crop_and_encode(page: &DynamicImage, spec: &RegionSpec) -> Result<ImageRegion, ExtractionError> {
    let (x, y, w, h) = spec.crop.to_pixels(page.width(), page.height());
    let cropped = if (x, y, w, h) == (0, 0, page.width(), page.height()) {
        encode_png(page)
    } else {
        encode_png(&page.crop_imm(x, y, w, h))
    };
    let png = cropped.map_err(|e| ExtractionError::EncodeFailed {
        region: spec.id.clone(),
        detail: e.to_string(),
    })?;
    Ok(ImageRegion {
        id: spec.id.clone(),
        page_index: spec.page,
        png,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionMode;
    use image::{GrayImage, Luma};

    #[test]
    fn crop_and_encode_cuts_the_requested_rectangle() {
        let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 100, Luma([255])));
        let spec = RegionSpec::new("right", 0, CropBox::new(0.5, 0.2, 1.0, 1.0));
        let region = crop_and_encode(&page, &spec).unwrap();
        assert_eq!(region.id, "right");
        let decoded = image::load_from_memory(&region.png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 80));
    }

    #[test]
    fn from_config_uses_mode_dpi() {
        let config = BatchConfig::builder("in", "out")
            .mode(ExtractionMode::FrontPage)
            .build()
            .unwrap();
        let ex = PdfiumExtractor::from_config(&config);
        assert_eq!(ex.dpi, 400);
        assert!(matches!(ex.plan, RegionPlan::Fixed(ref s) if s.len() == 2));
    }
}
