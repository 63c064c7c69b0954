use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use smartscan::config::{Engine, Settings};
use smartscan::export::ExportFormat;
use smartscan::input::{DocxReader, InputKind, PageLoader, PageSource};
use smartscan::pipeline::{run, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "smartscan")]
#[command(version, about = "OCR scanned documents into text, PDF or Word files, extracting figures", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a scanned PDF or image
    Convert {
        /// Input PDF, image or DOCX path
        input: PathBuf,

        /// Output file (default: ./<input_name>_<timestamp>.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        opts: ConvertOptions,

        /// Suppress progress messages
        #[arg(short, long)]
        quiet: bool,
    },

    /// Convert multiple files into one directory
    Batch {
        /// Input files
        inputs: Vec<PathBuf>,

        /// Output directory for all results
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        opts: ConvertOptions,
    },

    /// Show information about an input file
    Info {
        /// Input PDF, image or DOCX path
        input: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct ConvertOptions {
    /// Output format: txt, pdf, docx, md or json
    #[arg(short, long, default_value = "txt", value_parser = parse_format)]
    format: ExportFormat,

    /// Recognition language hint (Tesseract code, e.g. eng, deu)
    #[arg(short, long)]
    lang: Option<String>,

    /// Rasterization DPI for PDF pages
    #[arg(long)]
    dpi: Option<u32>,

    /// Recognizer: tesseract, trocr, donut or fallback
    #[arg(short, long, value_parser = parse_engine)]
    engine: Option<Engine>,

    /// Per-call recognizer timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Directory for extracted figures (default: <output>_figures)
    #[arg(long)]
    figures_dir: Option<PathBuf>,

    /// TrueType font to embed in PDF output (needed for non-Latin text)
    #[arg(long)]
    pdf_font: Option<PathBuf>,

    /// Process pages on a worker pool
    #[arg(long)]
    parallel: bool,

    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    s.parse().map_err(|e: smartscan::ScanError| e.to_string())
}

fn parse_engine(s: &str) -> Result<Engine, String> {
    s.parse().map_err(|e: smartscan::ScanError| e.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "smartscan=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            opts,
            quiet,
        } => convert_single(input, output, &opts, quiet),
        Commands::Batch {
            inputs,
            output,
            opts,
        } => convert_batch(inputs, output, &opts),
        Commands::Info { input } => show_info(input),
    }
}

fn load_settings(opts: &ConvertOptions) -> Result<Settings> {
    let mut settings = match &opts.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings: {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(dpi) = opts.dpi {
        settings.dpi = dpi;
    }
    if let Some(engine) = opts.engine {
        settings.recognizer.engine = engine;
    }
    if let Some(lang) = &opts.lang {
        settings.recognizer.language = lang.clone();
    }
    if let Some(timeout) = opts.timeout {
        settings.recognizer.timeout_secs = Some(timeout);
    }
    if let Some(font) = &opts.pdf_font {
        settings.export.pdf_font = Some(font.clone());
    }
    settings.parallel |= opts.parallel;
    settings.validate()?;
    Ok(settings)
}

fn default_output(input: &Path, format: ExportFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("{stem}_{stamp}.{}", format.extension()))
}

fn convert_single(
    input: PathBuf,
    output: Option<PathBuf>,
    opts: &ConvertOptions,
    quiet: bool,
) -> Result<()> {
    // Validate input
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }
    if !input.is_file() {
        anyhow::bail!("Input is not a file: {}", input.display());
    }

    let settings = load_settings(opts)?;
    let output = output.unwrap_or_else(|| default_output(&input, opts.format));

    let mut config = PipelineConfig::new(input.clone(), output.clone(), settings.dpi)
        .with_settings(&settings)
        .with_lang(Some(settings.recognizer.language.clone()));
    if let Some(dir) = &opts.figures_dir {
        config = config.with_figures_dir(dir.clone());
    }

    let recognizer = settings.recognizer.build_recognizer();

    if !quiet {
        println!("[*] Processing: {}", input.display());
        println!("[*] Output: {}", output.display());
        println!("[*] Recognizer: {}", recognizer.describe());
        println!("\n[+] Recognizing pages...");
    }

    let document = run(&config, &recognizer, opts.format)
        .with_context(|| format!("Failed to convert: {}", input.display()))?;

    if !quiet {
        println!(
            "[+] {} page(s), {} figure(s)",
            document.page_count(),
            document.figure_count()
        );
        if document.figure_count() > 0 {
            println!("[+] Figures: {}", config.figures_dir.display());
        }
        println!("\n[✓] Done! Saved to: {}", output.display());
    }

    Ok(())
}

fn convert_batch(inputs: Vec<PathBuf>, output: Option<PathBuf>, opts: &ConvertOptions) -> Result<()> {
    if inputs.is_empty() {
        anyhow::bail!("No input files specified");
    }

    let base_output = output.unwrap_or_else(|| PathBuf::from("batch_output"));

    println!("[*] Batch processing {} file(s)", inputs.len());
    println!("[*] Base output: {}\n", base_output.display());

    let mut success = 0;
    let mut failed = 0;

    for (i, input) in inputs.iter().enumerate() {
        println!("[{}/{}] Processing: {}", i + 1, inputs.len(), input.display());

        if !input.exists() {
            eprintln!("  [!] Skipped: file does not exist");
            failed += 1;
            continue;
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("input{}", i + 1));
        let target = base_output.join(format!("{stem}.{}", opts.format.extension()));

        match convert_single(input.clone(), Some(target), opts, true) {
            Ok(_) => {
                println!("  [✓] Success");
                success += 1;
            }
            Err(e) => {
                eprintln!("  [✗] Failed: {:#}", e);
                failed += 1;
            }
        }
        println!();
    }

    println!("\n[*] Summary: {} succeeded, {} failed", success, failed);

    if failed > 0 {
        anyhow::bail!("{} file(s) failed to process", failed);
    }

    Ok(())
}

fn show_info(input: PathBuf) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }

    let kind = InputKind::detect(&input)?;

    println!("Input Information");
    println!("=================");
    println!("File: {}", input.display());

    match kind {
        InputKind::Pdf => {
            let source = PageSource::open(&input, smartscan::config::DEFAULT_DPI)
                .with_context(|| format!("Failed to open PDF: {}", input.display()))?;
            println!("Type: PDF");
            println!("Pages: {}", source.page_count());
        }
        InputKind::Image => {
            let (width, height) = image::image_dimensions(&input)
                .with_context(|| format!("Failed to read image: {}", input.display()))?;
            println!("Type: image");
            println!("Pages: 1");
            println!("Size: {}x{} px", width, height);
        }
        InputKind::Docx => {
            let paragraphs = DocxReader::new(input.clone())
                .paragraphs()
                .with_context(|| format!("Failed to read DOCX: {}", input.display()))?;
            println!("Type: DOCX (text is extracted, not recognized)");
            println!("Pages: 1");
            println!("Paragraphs: {}", paragraphs.len());
        }
    }

    Ok(())
}
