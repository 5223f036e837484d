use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;
use folio_core::{
    Command, Document, DocumentProvider, RectF, SearchEvent, SearchFlags, Size, Viewer,
    ViewerConfig, ViewerContext, ZoomMode,
};
use folio_render::{save_png, PdfiumProvider};
use serde::Serialize;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Headless driver for the folio page viewport engine"
)]
struct Args {
    /// Config file to use instead of the platform default
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Print page count and metadata
    Info {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Lay the document out in a viewport and report what is visible
    Inspect {
        file: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
        /// Page to jump to before reporting (0-based)
        #[arg(short, long)]
        page: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Render one page through the page cache and write it as PNG
    Render {
        file: PathBuf,
        #[arg(short, long, default_value_t = 0)]
        page: usize,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value_t = 1.0)]
        zoom: f64,
    },
    /// Search the whole document, starting at a page and wrapping around
    Search {
        file: PathBuf,
        query: String,
        #[arg(long)]
        case_sensitive: bool,
        #[arg(long)]
        whole_word: bool,
        /// Page the scan starts from (0-based)
        #[arg(long, default_value_t = 0)]
        from: usize,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, clap::Args)]
struct ViewArgs {
    #[arg(long, default_value_t = 1280)]
    width: i32,
    #[arg(long, default_value_t = 800)]
    height: i32,
    #[arg(long, value_enum)]
    zoom_mode: Option<ZoomArg>,
    /// Absolute zoom factor; implies `--zoom-mode absolute`
    #[arg(long)]
    zoom: Option<f64>,
    /// Lay pages out as facing pairs
    #[arg(long)]
    facing: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ZoomArg {
    FitWidth,
    FitPage,
    Absolute,
}

impl From<ZoomArg> for ZoomMode {
    fn from(arg: ZoomArg) -> Self {
        match arg {
            ZoomArg::FitWidth => ZoomMode::FitWidth,
            ZoomArg::FitPage => ZoomMode::FitPage,
            ZoomArg::Absolute => ZoomMode::Absolute,
        }
    }
}

impl ViewArgs {
    fn apply(&self, config: &mut ViewerConfig) {
        if let Some(mode) = self.zoom_mode {
            config.zoom_mode = mode.into();
        }
        if let Some(zoom) = self.zoom {
            config.zoom_mode = ZoomMode::Absolute;
            config.zoom = zoom;
        }
        if self.facing {
            config.double_sided = true;
        }
    }

    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[derive(Debug, Serialize)]
struct InfoReport<'a> {
    path: &'a Path,
    page_count: usize,
    title: Option<&'a str>,
    author: Option<&'a str>,
    keywords: &'a [String],
}

#[derive(Debug, Serialize)]
struct InspectReport {
    page_count: usize,
    zoom_mode: ZoomMode,
    zoom: f64,
    double_sided: bool,
    current_page: Option<usize>,
    visible_pages: Vec<usize>,
    offset: (i32, i32),
    scroll_range: (i32, i32),
    layout_points: (f64, f64),
}

#[derive(Debug, Serialize)]
struct PageMatches<'a> {
    page: usize,
    rects: &'a [RectF],
}

#[derive(Debug, Serialize)]
struct SearchReport<'a> {
    query: &'a str,
    total: usize,
    pages: Vec<PageMatches<'a>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("org", "folio", "folio")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;
    let config = load_config(args.config.as_deref(), &project_dirs)?;

    let provider = PdfiumProvider::new()?;
    match args.command {
        CliCommand::Info { file, json } => {
            let document = open(&provider, &file).await?;
            print_info(document.as_ref(), json)
        }
        CliCommand::Inspect {
            file,
            view,
            page,
            json,
        } => {
            let document = open(&provider, &file).await?;
            let mut config = config;
            view.apply(&mut config);
            inspect(document, config, view.size(), page, json)
        }
        CliCommand::Render {
            file,
            page,
            output,
            zoom,
        } => {
            let document = open(&provider, &file).await?;
            let config = ViewerConfig {
                zoom_mode: ZoomMode::Absolute,
                zoom,
                ..config
            };
            render(document, config, page, &output)
        }
        CliCommand::Search {
            file,
            query,
            case_sensitive,
            whole_word,
            from,
            json,
        } => {
            let document = open(&provider, &file).await?;
            let flags = SearchFlags {
                case_sensitive,
                whole_word,
            };
            search(document, config, &query, flags, from, json)
        }
    }
}

async fn open(provider: &PdfiumProvider, path: &Path) -> Result<Arc<dyn Document>> {
    provider
        .open(path)
        .await
        .with_context(|| format!("failed to open {:?}", path))
}

fn load_config(explicit: Option<&Path>, project_dirs: &ProjectDirs) -> Result<ViewerConfig> {
    let config = match explicit {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::load_or_default(&project_dirs.config_dir().join("config.toml"))?,
    };
    debug!(?config, "loaded configuration");
    Ok(config)
}

fn print_info(document: &dyn Document, json: bool) -> Result<()> {
    let info = document.info();
    let report = InfoReport {
        path: &info.path,
        page_count: info.page_count,
        title: info.metadata.title.as_deref(),
        author: info.metadata.author.as_deref(),
        keywords: &info.metadata.keywords,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("path:     {}", report.path.display());
    println!("pages:    {}", report.page_count);
    println!("title:    {}", report.title.unwrap_or("-"));
    println!("author:   {}", report.author.unwrap_or("-"));
    if !report.keywords.is_empty() {
        println!("keywords: {}", report.keywords.join(", "));
    }
    Ok(())
}

fn inspect(
    document: Arc<dyn Document>,
    config: ViewerConfig,
    viewport: Size,
    page: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut viewer = Viewer::new(ViewerContext::new(document, config), viewport);
    if let Some(page) = page {
        viewer.apply(Command::GotoPage { page }, Instant::now());
    }

    let view = viewer.viewport();
    let tracker = view.tracker();
    let offset = tracker.offset();
    let range = tracker.scroll_range();
    let layout = view.layout().size();
    let report = InspectReport {
        page_count: view.page_count(),
        zoom_mode: view.zoom_mode(),
        zoom: view.zoom(),
        double_sided: view.double_sided(),
        current_page: view.current_page(),
        visible_pages: tracker.visible_pages(tracker.viewport_rect_points()),
        offset: (offset.x, offset.y),
        scroll_range: (range.width, range.height),
        layout_points: (layout.width, layout.height),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("pages:         {}", report.page_count);
    println!("zoom:          {:.3} ({:?})", report.zoom, report.zoom_mode);
    println!("facing pages:  {}", report.double_sided);
    match report.current_page {
        Some(page) => println!("current page:  {}", page),
        None => println!("current page:  -"),
    }
    println!("visible pages: {:?}", report.visible_pages);
    println!("offset:        {:?}", report.offset);
    println!("scroll range:  {:?}", report.scroll_range);
    println!(
        "layout:        {:.1} x {:.1} pt",
        report.layout_points.0, report.layout_points.1
    );
    Ok(())
}

fn render(
    document: Arc<dyn Document>,
    config: ViewerConfig,
    page: usize,
    output: &Path,
) -> Result<()> {
    let page_count = document.num_pages();
    if page >= page_count {
        bail!("page {} out of range (document has {} pages)", page, page_count);
    }
    let context = ViewerContext::new(document, config);
    let image = context
        .cache
        .get(page)
        .ok_or_else(|| anyhow!("page {} could not be rendered", page))?;
    save_png(&image, output)?;
    info!(
        page,
        width = image.width,
        height = image.height,
        output = %output.display(),
        "page written"
    );
    Ok(())
}

fn search(
    document: Arc<dyn Document>,
    config: ViewerConfig,
    query: &str,
    flags: SearchFlags,
    from: usize,
    json: bool,
) -> Result<()> {
    let viewport = Size::new(1280, 800);
    let mut viewer = Viewer::new(ViewerContext::new(document, config), viewport);
    let now = Instant::now();
    if from > 0 {
        viewer.apply(Command::GotoPage { page: from }, now);
    }
    viewer.find(query, flags, now);

    loop {
        viewer.pump(Instant::now());
        for event in viewer.drain_search_events() {
            match event {
                SearchEvent::Progress(fraction) => debug!(progress = fraction, "searching"),
                SearchEvent::HighlightMatch { page, .. } => info!(page, "first match"),
                SearchEvent::MatchesFound { page, matches } => {
                    debug!(page, count = matches.len(), "matches found")
                }
                SearchEvent::Started | SearchEvent::Finished => {}
            }
        }
        if !viewer.search().is_scanning() {
            break;
        }
    }

    let engine = viewer.search();
    let report = SearchReport {
        query,
        total: engine.matches_count(),
        pages: engine
            .matches()
            .iter()
            .map(|(page, rects)| PageMatches {
                page: *page,
                rects,
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for entry in &report.pages {
        for rect in entry.rects {
            println!(
                "page {:>4}  x={:.1} y={:.1} w={:.1} h={:.1}",
                entry.page, rect.x, rect.y, rect.width, rect.height
            );
        }
    }
    println!("{} matches for {:?}", report.total, report.query);
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "folio.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // stdout carries command output
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
