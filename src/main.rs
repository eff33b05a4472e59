use clap::{Parser, Subcommand};
use cropset::config::{self, EngineConfig};
use cropset::imaging::RustBackend;
use cropset::manager::DerivedImageManager;
use cropset::model::{Image, OwnerRef};
use cropset::output;
use cropset::size::StaticSizeSet;
use cropset::store::{DirFileStore, MemoryStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

fn version_string() -> &'static str {
    if env!("CROPSET_RELEASE_TAG") == "true" {
        return env!("CARGO_PKG_VERSION");
    }
    match env!("CROPSET_GIT_HASH") {
        "" => "dev@unknown",
        // Leaked once at startup
        hash => Box::leak(format!("dev@{hash}").into_boxed_str()),
    }
}

#[derive(Parser)]
#[command(name = "cropset")]
#[command(about = "Crop and resize originals into named size sets")]
#[command(long_about = "\
Crop and resize originals into named size sets

A size set is a named group of target sizes, declared in cropset.toml:

  [[size_sets]]
  name = \"Facebook\"

  [[size_sets.sizes]]
  name = \"Thumbnail\"
  slug = \"thumb\"
  width = 60
  height = 60
  retina = true             # also writes thumb@2x

Each size needs two of width, height and aspect_ratio; with only a width or a
height the other side follows the source image.

  cropset derive photos/ --set facebook --out derived/

copies every image under photos/ into derived/ and writes one file per size
next to it (dawn.jpg → dawn-thumb.png, dawn-thumb@2x.png, dawn-banner.png).
Crops are centered and keep as much of the source as the target ratio allows.

Run 'cropset gen-config' to generate a documented cropset.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Engine config file
    #[arg(long, default_value = "cropset.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct DeriveArgs {
    /// Image file or directory of images
    source: PathBuf,

    /// Size set to derive (name or slug)
    #[arg(long)]
    set: String,

    /// Output directory for originals and derived images
    #[arg(long, default_value = "derived")]
    out: PathBuf,

    /// Skip images that fail instead of stopping at the first error
    #[arg(long)]
    permissive: bool,

    /// Print a JSON report instead of progress lines
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Derive every size of a set from one image or a directory of images
    Derive(DeriveArgs),
    /// List the configured size sets
    Sizes,
    /// Print a stock cropset.toml with all options documented
    GenConfig,
}

/// JSON report entry of one source image.
#[derive(Serialize)]
struct DeriveReport {
    original: Image,
    derived: Vec<Image>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Derive(args) => {
            let config = config::load_config(&cli.config)?;
            derive(&config, &args)?;
        }
        Command::Sizes => {
            let config = config::load_config(&cli.config)?;
            output::print_size_sets(&config.size_sets());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn derive(config: &EngineConfig, args: &DeriveArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_thread_pool(&config.processing);
    let sources = collect_sources(&args.source)?;

    let mut manager = DerivedImageManager::new(
        MemoryStore::new(),
        DirFileStore::new(&args.out),
        RustBackend::new(),
    )
    .with_settings(config.render_settings());
    manager.register_configured_sets(config)?;

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = if args.json {
        None
    } else {
        manager = manager.with_events(tx.clone());
        Some(std::thread::spawn(move || {
            for event in rx {
                for line in output::format_derive_event(&event) {
                    println!("{}", line);
                }
            }
        }))
    };
    drop(tx);

    let mut reports = Vec::new();
    for (path, name) in &sources {
        let bytes = std::fs::read(path)?;
        let owner = OwnerRef::new(name.as_str());
        let original = manager.create_original(owner.clone(), name, &bytes)?;
        let id = original.id.ok_or("original was not persisted")?;

        let skipped = if args.permissive {
            let report =
                manager.generate_for_owner(&owner, &StaticSizeSet::new(&args.set), true)?;
            report.skipped.into_iter().map(|(_, reason)| reason).collect()
        } else {
            let mut stubs = manager.add_size_set(id, &args.set)?;
            let ids = manager.save_all(&mut stubs)?;
            manager.render_many(&ids)?;
            Vec::new()
        };

        reports.push(DeriveReport {
            original,
            derived: manager.derived(id)?,
            skipped,
        });
    }

    drop(manager);
    if let Some(printer) = printer {
        printer.join().ok();
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        let derived: usize = reports.iter().map(|r| r.derived.len()).sum();
        println!(
            "Derived {} images from {} originals → {}",
            derived,
            reports.len(),
            args.out.display()
        );
    }
    Ok(())
}

/// Source images with their logical names, relative to `source`.
///
/// A single file is named by its file name; a directory is walked
/// recursively in file name order.
fn collect_sources(source: &Path) -> Result<Vec<(PathBuf, String)>, Box<dyn std::error::Error>> {
    if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or("source has no file name")?;
        return Ok(vec![(source.to_path_buf(), name)]);
    }

    let mut sources = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_image(path) {
            continue;
        }
        let name = path
            .strip_prefix(source)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        sources.push((path.to_path_buf(), name));
    }
    if sources.is_empty() {
        return Err(format!("no images found under {}", source.display()).into());
    }
    Ok(sources)
}

fn is_image(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

/// Log to stderr, filtered by `RUST_LOG` (default: warnings).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
