//! Pixel Timeline CLI - Inspect and flatten packed sprite animations.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use pixel_timeline::{
    animation::{Codec, PackStats},
    schema::CanvasConfig,
    timeline::{FrameStatus, LayerStack},
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("--example") => print_example_config(),
        Some("info") if args.len() >= 3 => {
            let config = load_config(args.get(3));
            info(Path::new(&args[2]), &config);
        }
        Some("flatten") if args.len() >= 4 => {
            let config = load_config(args.get(4));
            flatten(Path::new(&args[2]), Path::new(&args[3]), &config);
        }
        _ => {
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage:");
    eprintln!("  {} info <file> [config.json]", program);
    eprintln!("  {} flatten <in> <out> [config.json]", program);
    eprintln!("  {} --example", program);
    eprintln!();
    eprintln!("Inspect or flatten packed sprite animation files.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  file         Packed animation file");
    eprintln!("  config.json  Canvas configuration (default: 200x200, 60 frames)");
    eprintln!();
    eprintln!("Example configuration is generated with --example flag.");
}

fn load_config(path: Option<&String>) -> CanvasConfig {
    let Some(path) = path else {
        return CanvasConfig::default();
    };
    let config_path = PathBuf::from(path);

    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: CanvasConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }
    config
}

fn load_stack(path: &Path, config: &CanvasConfig) -> (LayerStack, usize) {
    let bytes = fs::read(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let codec = Codec::new(config.dimensions());
    let state = codec.unpack(&bytes).unwrap_or_else(|e| {
        eprintln!("Error unpacking {}: {}", path.display(), e);
        std::process::exit(1);
    });

    let mut stack = LayerStack::new(config);
    if let Err(e) = stack.set_state(state) {
        eprintln!("Error restoring layers: {}", e);
        std::process::exit(1);
    }
    (stack, bytes.len())
}

fn info(path: &Path, config: &CanvasConfig) {
    let start = Instant::now();
    let (mut stack, size) = load_stack(path, config);
    let stats = PackStats::of(&stack.get_state(), size);

    println!("Sprite Animation");
    println!("================");
    println!(
        "Grid: {}x{} ({} frames)",
        config.cols, config.rows, config.frames
    );
    println!("Layers: {}", stats.layers);
    println!("Keyframes: {}", stats.keyframes);
    println!("Packed size: {} bytes", stats.bytes);
    println!();

    // Legend: # filled key, o blank key, - repeat, . empty
    for layer in stack.layers() {
        let strip: String = layer
            .frames_status()
            .into_iter()
            .map(FrameStatus::glyph)
            .collect();
        println!("  {:>12} |{}|", layer.name(), strip);
    }

    println!();
    println!("Time: {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);
}

fn flatten(input: &Path, output: &Path, config: &CanvasConfig) {
    let (mut stack, size) = load_stack(input, config);
    let codec = Codec::new(config.dimensions());

    let bytes = codec.pack_flattened(&mut stack).unwrap_or_else(|e| {
        eprintln!("Error packing: {}", e);
        std::process::exit(1);
    });

    fs::write(output, &bytes).unwrap_or_else(|e| {
        eprintln!("Error writing {}: {}", output.display(), e);
        std::process::exit(1);
    });

    println!(
        "Flattened {} layers: {} -> {} bytes",
        stack.len(),
        size,
        bytes.len()
    );
}

fn print_example_config() {
    let config = CanvasConfig::default();

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            std::process::exit(1);
        }
    }
}
