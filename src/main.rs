use clap::{ Arg, App };
use rusttype::Font;
use serde::Serialize;
use tracing::{ error, info };

use std::error::Error;
use std::fs;
use std::path::{ Path, PathBuf };

use anpr_rust::utils::{ self, TracingHook };
use anpr_rust::{ Anpr, AnprConfig, PlateResults, TesseractCli };

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Serialize)]
struct PlateLine<'a> {
    id: usize,
    plate_number: &'a str,
    country_identifier: &'a str,
    confidence: f32,
    bbox: [u32; 4],
}

#[derive(Serialize)]
struct ImageLine<'a> {
    file: String,
    plates: Vec<PlateLine<'a>>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let matches = App::new("ANPR")
                    .version("0.1.0")
                    .about("Reads number plates from photographs")
                    .arg(Arg::with_name("INPUT")
                        .help("image files or directories of images")
                        .required(true)
                        .multiple(true)
                        .index(1))
                    .arg(Arg::with_name("config")
                        .help("recognizer settings, .toml or .json")
                        .long("config")
                        .short("c")
                        .takes_value(true))
                    .arg(Arg::with_name("permissive")
                        .help("use the permissive outline filter")
                        .long("permissive")
                        .conflicts_with("config"))
                    .arg(Arg::with_name("tesseract")
                        .help("tesseract executable")
                        .long("tesseract")
                        .takes_value(true)
                        .default_value("tesseract"))
                    .arg(Arg::with_name("lang")
                        .help("tesseract language")
                        .long("lang")
                        .takes_value(true)
                        .default_value("eng"))
                    .arg(Arg::with_name("annotate")
                        .help("directory for copies of the inputs with the plates boxed")
                        .long("annotate")
                        .takes_value(true))
                    .arg(Arg::with_name("font")
                        .help("ttf font used to label annotated plates")
                        .long("font")
                        .takes_value(true)
                        .requires("annotate"))
                    .arg(Arg::with_name("display")
                        .help("show every pipeline stage in a window (display-window builds)")
                        .long("display"))
                    .get_matches();

    utils::init_tracing();

    let config = match matches.value_of("config") {
        Some(path) => AnprConfig::load(path)?,
        None if matches.is_present("permissive") => AnprConfig::permissive(),
        None => AnprConfig::default(),
    };
    let tesseract = TesseractCli::new(
        matches.value_of("tesseract").ok_or("tesseract is required")?,
        matches.value_of("lang").ok_or("lang is required")?,
    );
    let anpr = with_hook(Anpr::new(tesseract, config)?, matches.is_present("display"));

    let font = match matches.value_of("font") {
        Some(path) => Some(Font::try_from_vec(fs::read(path)?).ok_or("cannot parse font")?),
        None => None,
    };
    let annotate_dir = matches.value_of("annotate").map(PathBuf::from);
    if let Some(dir) = &annotate_dir {
        fs::create_dir_all(dir)?;
    }

    let inputs = matches.values_of("INPUT").ok_or("input is required")?;
    let files = collect_images(inputs.map(Path::new))?;
    info!("processing {} images", files.len());

    let mut success = 0;
    for file in &files {
        let img = match image::open(file) {
            Ok(img) => img,
            Err(e) => {
                error!("{}: {}", file.display(), e);
                continue;
            }
        };
        let results = match anpr.process_image(&img) {
            Ok(results) => results,
            Err(e) => {
                error!("{}: {}", file.display(), e);
                continue;
            }
        };
        if !results.is_empty() {
            success += 1;
        }
        println!("{}", serde_json::to_string(&image_line(file, &results))?);

        if let Some(dir) = &annotate_dir {
            let annotated = utils::annotate(&img, &results, font.as_ref());
            let name = file.file_name().ok_or("input without file name")?;
            annotated.save(dir.join(name))?;
        }
    }
    info!("plates found in {} of {} images", success, files.len());

    Ok(())
}

#[cfg(feature = "display-window")]
fn with_hook(anpr: Anpr<TesseractCli>, display: bool) -> Anpr<TesseractCli> {
    if display {
        anpr.with_hook(utils::WindowHook { max_width: 700, max_height: 700 })
    } else {
        anpr.with_hook(TracingHook)
    }
}

#[cfg(not(feature = "display-window"))]
fn with_hook(anpr: Anpr<TesseractCli>, display: bool) -> Anpr<TesseractCli> {
    if display {
        error!("--display needs a build with the display-window feature");
    }
    anpr.with_hook(TracingHook)
}

/// Files as given, directories expanded to the images directly inside them, sorted.
fn collect_images<'a>(inputs: impl Iterator<Item = &'a Path>) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.to_path_buf());
            continue;
        }
        let mut found: Vec<PathBuf> = fs::read_dir(input)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())))
            .collect();
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

fn image_line<'a>(file: &Path, results: &'a PlateResults) -> ImageLine<'a> {
    let plates = results.iter().map(|(id, result)| PlateLine {
        id: *id,
        plate_number: &result.plate_number,
        country_identifier: result.country_identifier.as_str(),
        confidence: result.confidence,
        bbox: result.region.to_array(),
    }).collect();
    ImageLine { file: file.display().to_string(), plates }
}
