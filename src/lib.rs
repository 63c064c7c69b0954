pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod input;
pub mod ocr;
pub mod pipeline;
pub mod segment;
pub mod storage;

pub use core::model::{BackendUsed, DocumentRecord, ExtractedFigure, FigureRegion, PageRecord};
pub use error::{Result, ScanError};
pub use export::{export, export_document, ExportFormat};
