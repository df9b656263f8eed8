use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use seeta_core::{FeatureVector, Identifier, Image, Landmarks};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "seeta", about = "Seeta face identification CLI")]
struct Cli {
    /// Identification model file (overrides SEETA_MODEL_PATH)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop and align a face into a new image file
    Crop {
        /// Source image
        #[arg(short, long)]
        image: PathBuf,
        /// Five landmarks as x0,y0,x1,y1,...,x4,y4
        #[arg(short, long, value_parser = parse_landmarks, allow_hyphen_values = true)]
        landmarks: Landmarks,
        /// Where to write the cropped face
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Extract a feature vector as JSON
    Extract {
        /// Source image (already cropped unless --landmarks is given)
        #[arg(short, long)]
        image: PathBuf,
        /// Let the engine crop using these landmarks first
        #[arg(short, long, value_parser = parse_landmarks, allow_hyphen_values = true)]
        landmarks: Option<Landmarks>,
        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Score two feature JSON files
    Compare { a: PathBuf, b: PathBuf },
    /// Show where the library and model are resolved from
    Info,
}

fn parse_landmarks(s: &str) -> Result<Landmarks, String> {
    let coords = s
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| format!("{v:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    Landmarks::from_flat(&coords).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().with_model(cli.model);

    match cli.command {
        Commands::Crop {
            image,
            landmarks,
            output,
        } => {
            let mut identifier = open_identifier(&config)?;
            let source = load_image(&image)?;
            let cropped = identifier.crop_face(&source, &landmarks)?;
            cropped
                .to_dynamic()
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            identifier.release()?;
            println!(
                "Cropped {}x{}x{} face to {}",
                cropped.height(),
                cropped.width(),
                cropped.channels(),
                output.display()
            );
        }
        Commands::Extract {
            image,
            landmarks,
            output,
        } => {
            let mut identifier = open_identifier(&config)?;
            let source = load_image(&image)?;
            let feature = match landmarks {
                Some(marks) => identifier.extract_feature_with_crop(&source, &marks)?,
                None => identifier.extract_feature(&source)?,
            };
            identifier.release()?;
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    let mut writer = BufWriter::new(file);
                    serde_json::to_writer(&mut writer, &feature)?;
                    writer.flush()?;
                }
                None => println!("{}", serde_json::to_string(&feature)?),
            }
        }
        Commands::Compare { a, b } => {
            let feature_a = load_feature(&a)?;
            let feature_b = load_feature(&b)?;
            let mut identifier = open_identifier(&config)?;
            let score = identifier.calc_similarity(feature_a.as_slice(), feature_b.as_slice())?;
            identifier.release()?;
            println!("{score}");
        }
        Commands::Info => {
            let candidates =
                seeta_sys::loader::library_candidates(config.lib_path.as_deref().map(Path::as_os_str))?;
            println!("Library candidates:");
            for candidate in &candidates {
                println!("  {}", candidate.display());
            }
            match seeta_sys::load() {
                Ok(lib) => println!("Library: {}", lib.path().display()),
                Err(e) => println!("Library: not loaded ({e})"),
            }
            let status = if config.model_path.exists() {
                "found"
            } else {
                "missing"
            };
            println!("Model: {} ({status})", config.model_path.display());
        }
    }

    Ok(())
}

fn open_identifier(config: &Config) -> Result<Identifier> {
    Identifier::new(&config.model_path)
        .with_context(|| format!("loading model {}", config.model_path.display()))
}

fn load_image(path: &Path) -> Result<Image> {
    let decoded = image::open(path).with_context(|| format!("reading {}", path.display()))?;
    let image = Image::from_dynamic(&decoded)?;
    tracing::debug!(
        path = %path.display(),
        height = image.height(),
        width = image.width(),
        channels = image.channels(),
        "loaded image"
    );
    Ok(image)
}

fn load_feature(path: &Path) -> Result<FeatureVector> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing feature vector {}", path.display()))
}
