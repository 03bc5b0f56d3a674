// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI tool: digitize a floor plan image and print the detections as JSON
//!
//! Usage:
//!   plan-trace <image_path> --ppc <px/cm> [options]

use anyhow::{bail, Context, Result};
use image::ImageReader;
use plan_trace::{
    detect_envelope, detect_room_at_pixel, detect_spanning_walls, preprocess_for_room_detection,
    DetectionMode, DetectionOptions, EnvelopeDetection, EnvelopeHint, Heuristics,
    PreprocessOptions, Rejection, RoomDetection, SpanningWall,
};
use serde::Serialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    image_path: PathBuf,
    pixels_per_cm: f64,
    seeds: Vec<(i64, i64)>,
    envelope: bool,
    spanning: bool,
    refine: bool,
    preprocess_out: Option<PathBuf>,
    heuristics_path: Option<PathBuf>,
    max_area_cm2: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomReport {
    seed: [i64; 2],
    room: Option<RoomDetection>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    image: String,
    width: u32,
    height: u32,
    pixels_per_cm: f64,
    rooms: Vec<RoomReport>,
    envelope: Option<EnvelopeDetection>,
    spanning_walls: Vec<SpanningWall>,
    rejections: Vec<Rejection>,
}

fn print_usage() {
    eprintln!("Usage: plan-trace <image_path> --ppc <px/cm> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --ppc <value>            Drawing scale in pixels per centimetre (required)");
    eprintln!("  --room <x> <y>           Detect the room around a seed pixel (repeatable)");
    eprintln!("  --envelope               Detect the building envelope");
    eprintln!("  --spanning               Detect spanning walls (implies --envelope)");
    eprintln!("  --refine                 Re-run envelope detection inside the first bbox");
    eprintln!("  --preprocess <out.png>   Clean the image before room detection and save it");
    eprintln!("  --heuristics <file>      JSON file overriding detection heuristics");
    eprintln!("  --max-area <cm2>         Largest room area a seed fill may grow to");
    eprintln!();
    eprintln!("Logging is controlled with RUST_LOG (e.g. RUST_LOG=plan_trace=debug).");
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .with_context(|| format!("missing value for {flag}"))
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args {
        image_path: PathBuf::from(&args[1]),
        ..Default::default()
    };
    let mut scale = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--ppc" => {
                let value = next_value(args, &mut i, "--ppc")?;
                let ppc = value
                    .parse::<f64>()
                    .with_context(|| format!("invalid --ppc '{value}'"))?;
                scale = Some(ppc);
            }
            "--room" => {
                let x = next_value(args, &mut i, "--room")?;
                let x = x.parse::<i64>().with_context(|| format!("invalid seed x '{x}'"))?;
                let y = next_value(args, &mut i, "--room")?;
                let y = y.parse::<i64>().with_context(|| format!("invalid seed y '{y}'"))?;
                parsed.seeds.push((x, y));
            }
            "--envelope" => parsed.envelope = true,
            "--spanning" => {
                parsed.spanning = true;
                parsed.envelope = true;
            }
            "--refine" => parsed.refine = true,
            "--preprocess" => {
                let out = next_value(args, &mut i, "--preprocess")?;
                parsed.preprocess_out = Some(PathBuf::from(out));
            }
            "--heuristics" => {
                let path = next_value(args, &mut i, "--heuristics")?;
                parsed.heuristics_path = Some(PathBuf::from(path));
            }
            "--max-area" => {
                let value = next_value(args, &mut i, "--max-area")?;
                let max_area = value
                    .parse::<f64>()
                    .with_context(|| format!("invalid --max-area '{value}'"))?;
                parsed.max_area_cm2 = Some(max_area);
            }
            other => bail!("unknown option: {other}"),
        }
        i += 1;
    }

    match scale {
        Some(ppc) => parsed.pixels_per_cm = ppc,
        None => bail!("--ppc is required"),
    }
    if parsed.refine {
        parsed.envelope = true;
    }
    Ok(parsed)
}

fn load_heuristics(path: Option<&PathBuf>) -> Result<Heuristics> {
    let Some(path) = path else {
        return Ok(Heuristics::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read heuristics file '{}'", path.display()))?;
    let heuristics: Heuristics = serde_json::from_str(&text)
        .with_context(|| format!("cannot parse heuristics file '{}'", path.display()))?;
    heuristics
        .validate()
        .with_context(|| format!("invalid heuristics in '{}'", path.display()))?;
    Ok(heuristics)
}

fn run(args: Args) -> Result<Report> {
    let heuristics = load_heuristics(args.heuristics_path.as_ref())?;
    let mut options = DetectionOptions {
        heuristics: heuristics.clone(),
        ..DetectionOptions::new(args.pixels_per_cm)
    };
    if let Some(max_area) = args.max_area_cm2 {
        options.max_area_cm2 = max_area;
    }

    let image = ImageReader::open(&args.image_path)
        .with_context(|| format!("cannot open image '{}'", args.image_path.display()))?
        .decode()
        .with_context(|| format!("cannot decode image '{}'", args.image_path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    info!(width, height, ppc = args.pixels_per_cm, "loaded plan image");

    let mut envelope = None;
    if args.envelope {
        envelope = detect_envelope(&image, &options)?;
        if args.refine {
            if let Some(first) = &envelope {
                let refined_options = DetectionOptions {
                    mode: DetectionMode::Refined { bbox: first.bbox },
                    ..options.clone()
                };
                if let Some(refined) = detect_envelope(&image, &refined_options)? {
                    envelope = Some(refined);
                }
            }
        }
        match &envelope {
            Some(found) => info!(vertices = found.polygon.len(), "envelope detected"),
            None => info!("no envelope found"),
        }
    }

    let mut rejections = Vec::new();
    let spanning_walls = match (&envelope, args.spanning) {
        (Some(found), true) => detect_spanning_walls(
            &image,
            &found.wall_mask,
            &found.building_mask,
            &options,
            Some(&mut rejections),
        )?,
        _ => Vec::new(),
    };

    let room_image = match &args.preprocess_out {
        Some(out) => {
            let mut pre_options = PreprocessOptions {
                heuristics: heuristics.clone(),
                ..PreprocessOptions::new(args.pixels_per_cm)
            };
            if let Some(found) = &envelope {
                let per_edge = (0..found.polygon.len())
                    .map(|i| found.thickness.for_edge(i).map_or(0.0, |e| e.thickness_px))
                    .collect();
                pre_options = pre_options.with_envelope(EnvelopeHint {
                    polygon: found.polygon.clone(),
                    wall_thicknesses_px: per_edge,
                });
            }
            let cleaned = preprocess_for_room_detection(&image, &pre_options)?;
            cleaned
                .image
                .save(out)
                .with_context(|| format!("cannot write '{}'", out.display()))?;
            info!(path = %out.display(), "wrote preprocessed image");
            cleaned.image
        }
        None => image,
    };

    let mut rooms = Vec::with_capacity(args.seeds.len());
    for &(x, y) in &args.seeds {
        let room = detect_room_at_pixel(&room_image, x, y, &options)?;
        info!(x, y, found = room.is_some(), "room detection");
        rooms.push(RoomReport { seed: [x, y], room });
    }

    Ok(Report {
        image: args.image_path.display().to_string(),
        width,
        height,
        pixels_per_cm: args.pixels_per_cm,
        rooms,
        envelope,
        spanning_walls,
        rejections,
    })
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return Ok(());
    }

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plan_trace=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {e:#}");
            print_usage();
            std::process::exit(2);
        }
    };

    let report = run(parsed)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
