//! The per-document process function: extract → OCR → assemble a record.

use crate::config::{BatchConfig, ExtractionMode, OcrConfig};
use crate::error::{BatchError, ExtractionError, ItemError};
use crate::output::{DocumentId, Processed, ResultRecord, WorkItem};
use crate::pipeline::input::validate_pdf;
use crate::pipeline::ocr::{OcrEngine, TesseractEngine};
use crate::pipeline::postprocess::clean_ocr_text;
use crate::pipeline::render::{ImageRegion, PdfiumExtractor, RegionExtractor};
use crate::pool::DocumentProcessor;
use crate::section::{ScanState, SectionDetector, SectionScan};
use async_trait::async_trait;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, Receiver};
use tracing::debug;

/// Result field holding the Description body.
pub const DESCRIPTION_FIELD: &str = "description";

/// [`DocumentProcessor`] that OCRs a PDF according to an [`ExtractionMode`].
///
/// Regions are rendered on a blocking thread and streamed to OCR one at a
/// time. In `Description` mode each page is fed to the section detector and
/// both rendering and OCR stop at the first page of the Drawings section.
/// The front-page modes OCR every planned region and store each under its
/// region id.
pub struct OcrPipeline {
    mode: ExtractionMode,
    extractor: Arc<dyn RegionExtractor>,
    engine: Arc<dyn OcrEngine>,
    ocr: OcrConfig,
    detector: SectionDetector,
}

impl OcrPipeline {
    pub fn new(
        mode: ExtractionMode,
        extractor: Arc<dyn RegionExtractor>,
        engine: Arc<dyn OcrEngine>,
        ocr: OcrConfig,
        detector: SectionDetector,
    ) -> Self {
        Self {
            mode,
            extractor,
            engine,
            ocr,
            detector,
        }
    }

    /// Build the pdfium + Tesseract pipeline described by `config`.
    ///
    /// Does not check that either collaborator works; see
    /// [`crate::batch::preflight`].
    pub fn from_config(config: &BatchConfig) -> Result<Self, BatchError> {
        Ok(Self::new(
            config.mode,
            Arc::new(PdfiumExtractor::from_config(config)),
            Arc::new(TesseractEngine::new(config.tesseract_cmd.clone())),
            config.ocr.clone(),
            SectionDetector::new(&config.section)?,
        ))
    }

    async fn recognize(&self, region: &ImageRegion) -> Result<String, ItemError> {
        let start = Instant::now();
        let raw = self
            .engine
            .recognize(region, &self.ocr)
            .await
            .map_err(|source| ItemError::Ocr {
                region: region.id.clone(),
                source,
            })?;
        debug!(region = %region.id, ms = start.elapsed().as_millis() as u64, "Region recognised");
        Ok(clean_ocr_text(&raw))
    }

    /// Returns the outcome and whether the scan stopped before the last page.
    async fn describe(
        &self,
        id: &DocumentId,
        regions: &mut Receiver<ImageRegion>,
    ) -> Result<(Processed, bool), ItemError> {
        let mut scanner = self.detector.scanner(id.clone());
        let mut stopped = false;
        while let Some(region) = regions.recv().await {
            let text = self.recognize(&region).await?;
            let page = self.detector.page(region.page_index, text);
            if scanner.feed(&page) == ScanState::Done {
                debug!(doc = %id, page = page.index, "Stopping at end of section");
                stopped = true;
                break;
            }
        }
        let processed = match scanner.finish() {
            SectionScan::Found(span) => {
                debug!(doc = %id, start = span.start_page, end = ?span.end_page, "Section located");
                Processed::Record(ResultRecord::new(id).with_field(DESCRIPTION_FIELD, span.text))
            }
            SectionScan::NotFound => Processed::SectionNotFound,
        };
        Ok((processed, stopped))
    }

    async fn columns(&self, id: &DocumentId, regions: &mut Receiver<ImageRegion>) -> Result<Processed, ItemError> {
        let mut record = ResultRecord::new(id);
        while let Some(region) = regions.recv().await {
            let text = self.recognize(&region).await?;
            record = record.with_field(region.id.clone(), text.trim());
        }
        Ok(Processed::Record(record))
    }
}

#[async_trait]
impl DocumentProcessor for OcrPipeline {
    async fn process(&self, item: &WorkItem) -> Result<Processed, ItemError> {
        item.id.validate()?;

        // Capacity 1: the renderer stays at most one region ahead of OCR.
        let (tx, mut rx) = mpsc::channel::<ImageRegion>(1);
        let extractor = Arc::clone(&self.extractor);
        let path = item.source_path.clone();
        let render = tokio::task::spawn_blocking(move || -> Result<(), ExtractionError> {
            validate_pdf(&path)?;
            // A send error means the consumer has stopped listening.
            extractor.extract_each(&path, &mut |region| match tx.blocking_send(region) {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            })
        });

        let consumed = match self.mode {
            ExtractionMode::Description => self.describe(&item.id, &mut rx).await,
            ExtractionMode::FrontPage | ExtractionMode::FrontPageContinued => {
                self.columns(&item.id, &mut rx).await.map(|p| (p, false))
            }
        };
        drop(rx);

        let rendered = render.await.map_err(|e| {
            if e.is_panic() {
                ItemError::Panicked(format!("Render task panicked: {}", e))
            } else {
                ItemError::Internal(format!("Render task cancelled: {}", e))
            }
        })?;
        match (consumed, rendered) {
            (Err(e), _) => Err(e),
            // Pages past the end of the section were never needed.
            (Ok((processed, true)), _) => Ok(processed),
            (Ok(_), Err(e)) => Err(e.into()),
            (Ok((processed, false)), Ok(())) => Ok(processed),
        }
    }
}
