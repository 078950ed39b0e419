use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use image::RgbaImage;
use log::{info, warn};
use pageview_core::{GestureState, ViewerConfig, ViewerEvent, ViewportController};
use pageview_render::{
    Document, DocumentSource, LopdfDocument, PageRasterizer, PageSize, SyntheticDocument,
    DEFAULT_PAGE_SIZE,
};
use pageview_ui::{Compositor, DrawCommand};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const RENDER_TIMEOUT: Duration = Duration::from_secs(30);
const FRAME: Duration = Duration::from_millis(16);

#[derive(Debug, Parser)]
#[command(name = "pageview")]
#[command(about = "Headless page viewer: document info, page rendering and viewport simulation")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Rasterize one page to a PNG file.
    Render(RenderArgs),
    /// Drive a viewport through gestures and print the resulting frame.
    Simulate(SimulateArgs),
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct RenderArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = 1.0)]
    scale: f32,
    /// Output PNG path.
    #[arg(long, value_name = "PATH")]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct SimulateArgs {
    #[arg(value_name = "FILE", required_unless_present = "synthetic", conflicts_with = "synthetic")]
    file: Option<PathBuf>,
    /// Use N US Letter pages instead of a file.
    #[arg(long, value_name = "N")]
    synthetic: Option<usize>,
    #[arg(long, default_value_t = 612.0)]
    width: f32,
    #[arg(long, default_value_t = 800.0)]
    height: f32,
    /// Scroll down by this many screen pixels.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    scroll: f32,
    /// Press zoom-in this many times.
    #[arg(long, default_value_t = 0)]
    zoom_in: u32,
    /// Pinch around the viewport center by this factor.
    #[arg(long)]
    pinch: Option<f32>,
    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: usize,
    title: Option<String>,
    author: Option<String>,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    index: usize,
    width: f32,
    height: f32,
    rotation: u16,
    /// Dimensions could not be read and a default page size stands in
    substituted: bool,
}

#[derive(Debug, Serialize)]
struct FrameOutput {
    page_count: usize,
    scale: f32,
    fit_scale: f32,
    scroll_x: f32,
    scroll_y: f32,
    current_page: Option<usize>,
    visible_pages: Vec<usize>,
    draw: Vec<DrawOutput>,
    cache: CacheOutput,
    renders: RenderOutput,
    errors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DrawOutput {
    page: usize,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rendered_scale: Option<f32>,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct CacheOutput {
    entries: usize,
    memory_used: usize,
    memory_limit: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    rejected: u64,
}

#[derive(Debug, Serialize)]
struct RenderOutput {
    requested: u64,
    completed: u64,
    failed: u64,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Render(args) => run_render(args),
        Commands::Simulate(args) => run_simulate(args),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let document = LopdfDocument::open(file).context("failed to open PDF")?;
    let info = document.info().context("failed to read document info")?;

    let pages = (0..info.page_count).map(|index| page_output(&document, index)).collect();

    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count: info.page_count,
        title: info.title,
        author: info.author,
        pages,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn page_output(document: &impl DocumentSource, index: usize) -> PageOutput {
    match document.page_info(index) {
        Ok(page) => {
            let PageSize { width, height } = page.size;
            PageOutput {
                index,
                width,
                height,
                rotation: page.rotation.degrees(),
                substituted: false,
            }
        }
        Err(error) => {
            warn!("page {index}: {error}, using default page size");
            let PageSize { width, height } = DEFAULT_PAGE_SIZE;
            PageOutput { index, width, height, rotation: 0, substituted: true }
        }
    }
}

fn run_render(args: RenderArgs) -> Result<()> {
    ensure_pdf_exists(&args.file)?;
    if args.page == 0 {
        anyhow::bail!("page numbers start at 1");
    }

    let document = open_document(&args.file)?;
    let index = args.page - 1;
    let bitmap = document
        .render(index, args.scale)
        .with_context(|| format!("failed to render page {}", args.page))?;

    let (width, height) = (bitmap.width(), bitmap.height());
    let image = RgbaImage::from_raw(width, height, bitmap.into_pixels())
        .context("bitmap does not match its dimensions")?;
    image
        .save(&args.out)
        .with_context(|| format!("failed to write {}", args.out.display()))?;

    info!("wrote page {} at {:.2}x to {}", args.page, args.scale, args.out.display());
    println!("{}", args.out.display());
    Ok(())
}

fn run_simulate(args: SimulateArgs) -> Result<()> {
    let config = ViewerConfig::load(args.config.as_deref()).context("failed to load config")?;
    let mut viewer = ViewportController::new(config);
    let events = viewer.events();
    viewer.on_resize(args.width, args.height);

    match (&args.file, args.synthetic) {
        (Some(file), _) => {
            ensure_pdf_exists(file)?;
            viewer.set_document(open_document(file)?);
        }
        (None, Some(pages)) => {
            viewer.set_document(Arc::new(SyntheticDocument::uniform(pages, DEFAULT_PAGE_SIZE)));
        }
        (None, None) => anyhow::bail!("either FILE or --synthetic is required"),
    }

    if !viewer.wait_for_load(LOAD_TIMEOUT) {
        anyhow::bail!("timed out loading document");
    }
    let mut errors = Vec::new();
    for event in events.try_iter() {
        if let ViewerEvent::Error(error) = event {
            if error.is_fatal() {
                return Err(error).context("failed to open PDF");
            }
            errors.push(error.to_string());
        }
    }
    viewer.wait_for_renders(RENDER_TIMEOUT);

    if args.scroll != 0.0 {
        viewer.on_scroll(0.0, args.scroll);
        viewer.on_scroll_end();
    }
    for _ in 0..args.zoom_in {
        viewer.zoom_in();
        settle(&mut viewer)?;
    }
    if let Some(factor) = args.pinch {
        let center = viewer.state().viewport_center();
        viewer.on_pinch_begin();
        viewer.on_pinch(factor, center);
        viewer.on_pinch_end();
    }
    settle(&mut viewer)?;

    for event in events.try_iter() {
        if let ViewerEvent::Error(error) = event {
            errors.push(error.to_string());
        }
    }

    let draw = Compositor::new()
        .compose_frame(viewer.frame_inputs())
        .commands
        .iter()
        .map(draw_output)
        .collect();

    let state = *viewer.state();
    let cache = viewer.cache_stats();
    let renders = viewer.render_stats();
    let payload = FrameOutput {
        page_count: viewer.page_count(),
        scale: state.scale,
        fit_scale: state.fit_scale,
        scroll_x: state.scroll_x,
        scroll_y: state.scroll_y,
        current_page: viewer.current_page(),
        visible_pages: viewer.visible_pages(),
        draw,
        cache: CacheOutput {
            entries: cache.entry_count,
            memory_used: cache.memory_used,
            memory_limit: cache.memory_limit,
            hits: cache.hits,
            misses: cache.misses,
            evictions: cache.evictions,
            rejected: cache.rejected,
        },
        renders: RenderOutput {
            requested: renders.requested,
            completed: renders.completed,
            failed: renders.failed,
        },
        errors,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    viewer.teardown();
    Ok(())
}

#[cfg(not(feature = "pdfium"))]
fn open_document(file: &Path) -> Result<Arc<impl Document + 'static>> {
    Ok(Arc::new(LopdfDocument::open(file).context("failed to open PDF")?))
}

#[cfg(feature = "pdfium")]
fn open_document(file: &Path) -> Result<Arc<impl Document + 'static>> {
    let document = pageview_render::PdfiumDocument::open(file).context("failed to open PDF")?;
    Ok(Arc::new(document))
}

/// Pump frames until animations, the settle timer and renders are done
fn settle(viewer: &mut ViewportController) -> Result<()> {
    let deadline = Instant::now() + RENDER_TIMEOUT;
    loop {
        viewer.tick();
        if viewer.gesture() == GestureState::Idle && !viewer.is_settle_pending() {
            break;
        }
        if Instant::now() >= deadline {
            anyhow::bail!("timed out waiting for the viewport to settle");
        }
        thread::sleep(FRAME);
    }
    viewer.wait_for_renders(RENDER_TIMEOUT);
    viewer.tick();
    Ok(())
}

fn draw_output(command: &DrawCommand) -> DrawOutput {
    let rect = command.rect();
    let (kind, rendered_scale) = match command {
        DrawCommand::Bitmap { rendered_scale, .. } => ("bitmap", Some(*rendered_scale)),
        DrawCommand::Placeholder { .. } => ("placeholder", None),
    };
    DrawOutput {
        page: command.page(),
        kind,
        rendered_scale,
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
