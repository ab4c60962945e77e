use std::collections::BTreeMap;
use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde_json::Map;
use tilegrid_persist::{BinaryCodec, DecodeWarning, TextCodec, WorldDocument};
use tilegrid_shared::{BlockRegistry, BlockTable, Layer, World};
use tracing::info;

const USAGE: &str = "Usage: world_inspector <blocks.toml> <world.json>\n       world_inspector <blocks.toml> <world.bin> --size <W>x<H> [--json <out.json>]";

struct Options {
    registry_path: PathBuf,
    world_path: PathBuf,
    size: Option<(u32, u32)>,
    json_out: Option<PathBuf>,
}

fn main() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();

    let options = match parse_args(env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{USAGE}");
            return;
        }
        Err(err) => {
            eprintln!("{err}\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(&options) {
        eprintln!("world_inspector error: {err}");
        std::process::exit(1);
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Options>, String> {
    let mut positional = Vec::new();
    let mut size = None;
    let mut json_out = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--size" => {
                let value = args.next().ok_or("--size expects <W>x<H>")?;
                size = Some(parse_size(&value)?);
            }
            "--json" => {
                let value = args.next().ok_or("--json expects a path argument")?;
                json_out = Some(PathBuf::from(value));
            }
            "--help" | "-h" => return Ok(None),
            other if other.starts_with("--") => return Err(format!("unknown argument: {other}")),
            other => positional.push(PathBuf::from(other)),
        }
    }

    let [registry_path, world_path]: [PathBuf; 2] = positional
        .try_into()
        .map_err(|_| "expected a block manifest and a world file".to_string())?;

    Ok(Some(Options {
        registry_path,
        world_path,
        size,
        json_out,
    }))
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| format!("invalid size '{value}'; expected <W>x<H>"))?;
    let width = width
        .parse::<u32>()
        .map_err(|err| format!("invalid width '{width}': {err}"))?;
    let height = height
        .parse::<u32>()
        .map_err(|err| format!("invalid height '{height}': {err}"))?;
    Ok((width, height))
}

fn run(options: &Options) -> Result<(), String> {
    let registry = BlockTable::load(&options.registry_path).map_err(|err| err.to_string())?;
    let world = match options.size {
        Some((width, height)) => load_binary(&registry, &options.world_path, width, height)?,
        None => load_document(&registry, &options.world_path)?,
    };

    println!("World: {}", options.world_path.display());
    println!("Size: {}x{}", world.width(), world.height());
    for layer in Layer::ALL {
        println!("{layer}:");
        for (name, count) in block_counts(&registry, &world, layer) {
            println!("  {name}: {count}");
        }
    }

    if let Some(json_out) = &options.json_out {
        let document = TextCodec::new(&registry)
            .encode(&world, Map::new())
            .map_err(|err| format!("failed to encode {}: {err}", options.world_path.display()))?;
        let file = File::create(json_out)
            .map_err(|err| format!("failed to create {}: {err}", json_out.display()))?;
        document
            .write_json(file, true)
            .map_err(|err| format!("failed to write {}: {err}", json_out.display()))?;
        info!("Wrote world document to {}", json_out.display());
    }

    Ok(())
}

fn load_binary(registry: &BlockTable, path: &Path, width: u32, height: u32) -> Result<World, String> {
    let file = File::open(path).map_err(|err| format!("failed to open {}: {err}", path.display()))?;
    let mut world = World::new(width, height).map_err(|err| err.to_string())?;
    let report = BinaryCodec::new(registry)
        .decode_into(&mut world, file)
        .map_err(|err| format!("failed to decode {}: {err}", path.display()))?;

    for warning in &report.warnings {
        match warning {
            DecodeWarning::BufferLengthMismatch { consumed, available } => {
                println!("Warning: consumed {consumed} of {available} bytes");
            }
            DecodeWarning::UnknownBlockId { id, count, first } => {
                println!(
                    "Warning: unknown block id {id} in {count} cells, first at ({}, {}) in {}",
                    first.x, first.y, first.layer
                );
            }
        }
    }

    Ok(world)
}

fn load_document(registry: &BlockTable, path: &Path) -> Result<World, String> {
    let file = File::open(path).map_err(|err| format!("failed to open {}: {err}", path.display()))?;
    let document = WorldDocument::read_json(file)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    for (key, value) in &document.metadata {
        println!("Metadata {key}: {value}");
    }
    TextCodec::new(registry)
        .decode(&document)
        .map_err(|err| format!("failed to decode {}: {err}", path.display()))
}

fn block_counts(registry: &BlockTable, world: &World, layer: Layer) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for (_, _, block) in world.cells(layer) {
        let name = registry
            .name_of(block.id())
            .map(str::to_string)
            .unwrap_or_else(|_| format!("#{}", block.id()));
        *counts.entry(name).or_insert(0) += 1;
    }
    counts
}
