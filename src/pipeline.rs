use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::core::model::{DocumentRecord, ExtractedFigure, PageImage, PageRecord};
use crate::core::text::clean_text;
use crate::error::{Result, ScanError};
use crate::export::{export_document_with, ExportFormat, ExportOptions};
use crate::input::{DocxReader, InputKind, PageLoader, PageSource};
use crate::ocr::{NormalizeOptions, Normalizer, Recognizer};
use crate::segment::{SegmentOptions, Segmenter};
use crate::storage::{DirFigureStore, FigureStore};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub figures_dir: PathBuf,
    pub dpi: u32,
    pub lang: Option<String>,
    pub parallel: bool,
    pub normalize: NormalizeOptions,
    pub segment: SegmentOptions,
    pub export: ExportOptions,
}

impl PipelineConfig {
    /// `output` is the exported file; figures go to `<output stem>_figures`
    /// next to it unless overridden.
    pub fn new(input: PathBuf, output: PathBuf, dpi: u32) -> Self {
        let figures_dir = default_figures_dir(&output);
        Self {
            input,
            output,
            figures_dir,
            dpi,
            lang: None,
            parallel: false,
            normalize: NormalizeOptions::default(),
            segment: SegmentOptions::default(),
            export: ExportOptions::default(),
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.dpi = settings.dpi;
        self.parallel = settings.parallel;
        self.normalize = settings.normalize;
        self.segment = settings.segment;
        self.export = settings.export.clone();
        self
    }

    pub fn with_figures_dir(mut self, figures_dir: PathBuf) -> Self {
        self.figures_dir = figures_dir;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_lang(mut self, lang: Option<String>) -> Self {
        self.lang = lang;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_normalize(mut self, normalize: NormalizeOptions) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_segment(mut self, segment: SegmentOptions) -> Self {
        self.segment = segment;
        self
    }
}

pub fn default_figures_dir(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("{stem}_figures"))
}

/// Turns one page image into a [`PageRecord`].
///
/// Recognition runs on the normalized image, segmentation on the original.
/// Neither pass can stop the other: a failed read still yields figures, and
/// a figure that cannot be saved is skipped without touching the text.
pub struct PageAssembler<'a> {
    normalizer: Normalizer,
    segmenter: Segmenter,
    recognizer: &'a Recognizer,
    store: &'a dyn FigureStore,
    lang: Option<String>,
}

impl<'a> PageAssembler<'a> {
    pub fn new(recognizer: &'a Recognizer, store: &'a dyn FigureStore) -> Self {
        Self {
            normalizer: Normalizer::default(),
            segmenter: Segmenter::default(),
            recognizer,
            store,
            lang: None,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_segmenter(mut self, segmenter: Segmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_lang(mut self, lang: Option<String>) -> Self {
        self.lang = lang;
        self
    }

    pub fn process_page(&self, page: &PageImage) -> PageRecord {
        let normalized = self.normalizer.normalize(&page.image);
        let result = self.recognizer.recognize(&normalized, self.lang.as_deref());
        if result.is_failed() {
            warn!(page = page.index, "recognition failed, keeping page without text");
        }

        let figures = self.extract_figures(page);
        debug!(
            page = page.index,
            backend = result.backend_used.label(),
            figures = figures.len(),
            "page assembled"
        );

        PageRecord {
            page_index: page.index,
            text: clean_text(&result.text),
            backend_used: result.backend_used,
            figures,
            width: page.width(),
            height: page.height(),
        }
    }

    fn extract_figures(&self, page: &PageImage) -> Vec<ExtractedFigure> {
        let regions = self.segmenter.segment_figures(&page.image, page.index);
        let mut figures = Vec::with_capacity(regions.len());

        for (i, region) in regions.into_iter().enumerate() {
            let ordinal = i + 1;
            let Some(bbox) = region.bbox.clamp_to(page.width(), page.height()) else {
                continue;
            };
            let crop = page.image.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);
            match self.store.save_figure(page.index, ordinal, &crop) {
                Ok(path) => figures.push(ExtractedFigure {
                    region,
                    ordinal,
                    path,
                }),
                Err(e) => warn!(page = page.index, ordinal, error = %e, "skipping figure"),
            }
        }
        figures
    }
}

fn load_and_process(
    loader: &dyn PageLoader,
    assembler: &PageAssembler<'_>,
    index: usize,
) -> Result<PageRecord> {
    match loader.load_page(index) {
        Ok(page) => Ok(assembler.process_page(&page)),
        Err(ScanError::Render(msg)) => {
            warn!(page = index, error = %msg, "page could not be rendered");
            Ok(PageRecord::empty(index))
        }
        Err(e) => Err(e),
    }
}

/// Run every page of `loader` through `assembler`. A page that cannot be
/// rendered is kept as an empty FAILED record under its own index.
pub fn build_pages(
    loader: &dyn PageLoader,
    assembler: &PageAssembler<'_>,
    parallel: bool,
) -> Result<Vec<PageRecord>> {
    let page_count = loader.page_count();
    if parallel {
        (1..=page_count)
            .into_par_iter()
            .map(|index| load_and_process(loader, assembler, index))
            .collect()
    } else {
        (1..=page_count)
            .map(|index| load_and_process(loader, assembler, index))
            .collect()
    }
}

/// Process every page of `config.input`, in page order.
pub fn build_document(config: &PipelineConfig, recognizer: &Recognizer) -> Result<DocumentRecord> {
    if InputKind::detect(&config.input)? == InputKind::Docx {
        info!(input = %config.input.display(), "reading text from docx");
        let page = DocxReader::new(config.input.clone()).read_page()?;
        return Ok(DocumentRecord::new(vec![page]));
    }

    let source = PageSource::open(&config.input, config.dpi)?;
    let store = DirFigureStore::new(config.figures_dir.clone());
    info!(
        input = %config.input.display(),
        pages = source.page_count(),
        recognizer = %recognizer.describe(),
        "building document"
    );

    let assembler = PageAssembler::new(recognizer, &store)
        .with_normalizer(Normalizer::new(config.normalize))
        .with_segmenter(Segmenter::new(config.segment))
        .with_lang(config.lang.clone());

    let pages = build_pages(&source, &assembler, config.parallel)?;
    Ok(DocumentRecord::new(pages))
}

/// Build and export in one go; returns the document that was written.
pub fn run(
    config: &PipelineConfig,
    recognizer: &Recognizer,
    format: ExportFormat,
) -> Result<DocumentRecord> {
    let document = build_document(config, recognizer)?;
    export_document_with(&document, format, &config.output, &config.export)?;
    Ok(document)
}
