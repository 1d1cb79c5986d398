use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use image_gallery::config::{AppConfig, Engine};
use image_gallery::coordinator::Settled;
use image_gallery::gallery::Gallery;
use image_gallery::metadata::{format_file_size, format_upload_date, Image, ImageEdit};
use image_gallery::processor;
use image_gallery::service::ImageService;
use image_gallery::service_clients::{http::HttpImageService, local::LocalImageService};
use image_gallery::viewport::{Viewport, ViewportGeometry};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "image-gallery", version, about = "Browse and manage a remote image gallery")]
struct Cli {
    /// Overrides the configured engine.
    #[arg(long, value_enum)]
    engine: Option<EngineArg>,

    /// Directory of images to seed the local engine with.
    #[arg(long)]
    seed_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineArg {
    Http,
    Local,
}

#[derive(Subcommand)]
enum Command {
    /// Scroll through the gallery page by page.
    Browse {
        #[arg(long, default_value_t = 3)]
        pages: usize,
        #[arg(long)]
        search: Option<String>,
    },
    /// Upload a single image file.
    Upload {
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
    },
    /// Upload every image under a directory.
    UploadDir { dir: PathBuf },
    /// Change an image's title and description.
    Edit {
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
    },
    Delete { id: String },
    /// Save an image's bytes to a file.
    Download { id: String, output: PathBuf },
}

const COLUMNS: usize = 3;
const ROW_HEIGHT: f64 = 320.0;
const VIEWPORT_HEIGHT: f64 = 900.0;

/// A pretend scroll surface laid out as a fixed-width grid.
struct TerminalView {
    offset: f64,
    content_height: f64,
}

impl TerminalView {
    fn new() -> Self {
        Self {
            offset: 0.0,
            content_height: 0.0,
        }
    }

    fn layout(&mut self, image_count: usize) {
        let rows = image_count.div_ceil(COLUMNS);
        self.content_height = rows as f64 * ROW_HEIGHT;
    }

    fn scroll_to_bottom(&mut self) {
        self.offset = (self.content_height - VIEWPORT_HEIGHT).max(0.0);
    }
}

impl Viewport for TerminalView {
    fn scroll_offset(&self) -> f64 {
        self.offset
    }

    fn scroll_to(&mut self, offset: f64) {
        self.offset = offset.clamp(0.0, self.content_height.max(0.0));
    }

    fn geometry(&self) -> ViewportGeometry {
        ViewportGeometry {
            scroll_offset: self.offset,
            viewport_height: VIEWPORT_HEIGHT,
            sentinel_top: self.content_height,
        }
    }
}

fn print_image(image: &Image) {
    let dimensions = match (image.width, image.height) {
        (Some(w), Some(h)) => format!("{}x{}", w, h),
        _ => "?x?".to_string(),
    };
    println!(
        "{:<26} {:<30} {:>10} {:>11}  {}",
        image.file_id.chars().take(24).collect::<String>(),
        image.title,
        format_file_size(image.size),
        dimensions,
        format_upload_date(&image.upload_date)
    );
}

async fn render(gallery: &Gallery<TerminalView>, shown: usize) -> usize {
    let state = gallery.snapshot().await;
    gallery.viewport().await.layout(state.images.len());
    for image in state.images.iter().skip(shown) {
        print_image(image);
    }
    if let Some(error) = &state.error {
        eprintln!("error: {}", error);
    }
    gallery.render_complete().await;
    state.images.len()
}

async fn browse(gallery: &Gallery<TerminalView>, pages: usize, search: Option<String>) {
    let first = match search {
        Some(term) => gallery.search(Some(term)).await,
        None => gallery.mount().await,
    };
    let mut shown = render(gallery, 0).await;
    if let Some(Settled::Failed { .. }) = first {
        return;
    }

    for _ in 1..pages {
        gallery.viewport().await.scroll_to_bottom();
        match gallery.poll_sentinel().await {
            Some(Settled::Failed { .. }) => {
                render(gallery, shown).await;
                break;
            }
            Some(_) => shown = render(gallery, shown).await,
            None => break,
        }
    }

    let state = gallery.snapshot().await;
    if state.images.is_empty() && !state.has_more {
        println!("No images found.");
    } else if !state.has_more {
        println!("-- end of gallery ({} images) --", state.images.len());
    }
}

async fn build_service(config: &AppConfig, seed_dir: Option<PathBuf>) -> Result<Arc<dyn ImageService>> {
    let service: Arc<dyn ImageService> = match config.engine {
        Engine::Http => Arc::new(HttpImageService::new(config)?),
        Engine::Local => match seed_dir {
            Some(dir) => Arc::new(LocalImageService::from_directory(dir, config).await?),
            None => Arc::new(LocalImageService::new()),
        },
    };
    Ok(service)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::new()?;
    if let Some(engine) = cli.engine {
        config.engine = match engine {
            EngineArg::Http => Engine::Http,
            EngineArg::Local => Engine::Local,
        };
        config.validate()?;
    }

    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    info!("Starting image-gallery ({:?} engine)", config.engine);

    let service = build_service(&config, cli.seed_dir).await?;
    let gallery = Gallery::new(service, TerminalView::new(), &config);

    match cli.command {
        Command::Browse { pages, search } => browse(&gallery, pages.max(1), search).await,
        Command::Upload {
            file,
            title,
            description,
            width,
            height,
        } => {
            let mut upload = processor::prepare_upload(&file, title, description)?;
            upload.width = width.or(upload.width);
            upload.height = height.or(upload.height);
            let image = gallery.upload(upload).await?;
            print_image(&image);
        }
        Command::UploadDir { dir } => {
            let allowed = config.allowed_extensions.clone();
            let workers = config.num_workers;
            let uploads = tokio::task::spawn_blocking(move || {
                processor::prepare_directory(&dir, &allowed, workers)
            })
            .await??;

            let mut failed = 0;
            for upload in uploads {
                let name = upload.file_name.clone();
                match gallery.upload(upload).await {
                    Ok(image) => print_image(&image),
                    Err(e) => {
                        failed += 1;
                        log::error!("Upload of {} failed: {}", name, e);
                    }
                }
            }
            if failed > 0 {
                bail!("{} uploads failed", failed);
            }
        }
        Command::Edit {
            id,
            title,
            description,
            width,
            height,
        } => {
            let edit = ImageEdit {
                title,
                description,
                width,
                height,
            };
            let image = gallery.update(&id, edit).await?;
            print_image(&image);
        }
        Command::Delete { id } => {
            gallery.delete(&id).await?;
            println!("Deleted {}", id);
        }
        Command::Download { id, output } => {
            let written = gallery.download(&id, &output).await?;
            println!("Saved {} to {}", format_file_size(written), output.display());
        }
    }

    info!("image-gallery finished");

    Ok(())
}
