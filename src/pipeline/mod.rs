//! Per-document stages of the OCR pipeline.
//!
//! Each submodule implements exactly one transformation step, so the
//! collaborators at the two external seams (rendering and OCR) can be swapped
//! for fakes in tests without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ ocr ──▶ postprocess ──▶ document
//! (magic)   (pdfium)   (PNG)     (tesseract) (cleanup)    (section / columns)
//! ```
//!
//! 1. [`input`] : reject missing or non-PDF files with a precise reason
//! 2. [`render`]: rasterise pages and crop them per [`regions`]; blocking
//! 3. [`encode`]: grayscale PNG bytes for each region
//! 4. [`ocr`]   : the OCR adapter trait and its Tesseract implementation
//! 5. [`postprocess`]: normalise raw engine output
//! 6. [`document`]: the [`crate::pool::DocumentProcessor`] tying it together

pub mod document;
pub mod encode;
pub mod input;
pub mod ocr;
pub mod postprocess;
pub mod regions;
pub mod render;
