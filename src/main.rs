use log::LevelFilter;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

const USAGE: &str = "Usage: balimidi [--settings <settings.yaml>] [--trace <position>] <score.yaml> [output.mid]";

/// Logging is controlled with RUST_LOG; see docs for the env_logger crate.
fn init_logging() {
    let mut log_builder = env_logger::builder();
    if env::var("RUST_LOG").is_err() {
        log_builder.filter_level(LevelFilter::Info);
    }
    log_builder.init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn main() {
    init_logging();
    let args: Vec<String> = env::args().skip(1).collect();

    let mut settings_path: Option<&String> = None;
    let mut trace_position: Option<&String> = None;
    let mut paths = Vec::new();

    // Parse flags
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--settings" => settings_path = Some(iter.next().unwrap_or_else(|| fail(USAGE))),
            "--trace" => trace_position = Some(iter.next().unwrap_or_else(|| fail(USAGE))),
            flag if flag.starts_with("--") => fail(format!("Unknown option '{}'\n{}", flag, USAGE)),
            _ => paths.push(arg),
        }
    }

    let (input_path, output_path) = match paths.as_slice() {
        [input] => (*input, None),
        [input, output] => (*input, Some(*output)),
        _ => fail(USAGE),
    };

    let settings = match settings_path {
        Some(path) => balimidi::RunSettings::load(path).unwrap_or_else(|e| fail(format!("Error: {}", e))),
        None => balimidi::RunSettings::default(),
    };

    // Read input file
    let source = match fs::read_to_string(input_path) {
        Ok(content) => content,
        Err(e) => fail(format!("Error reading file '{}': {}", input_path, e)),
    };

    if let Some(position) = trace_position {
        let position = (position != "all").then_some(position.as_str());
        let played = balimidi::trace(&source, &settings, position)
            .unwrap_or_else(|e| fail(format!("Error: {}", e)));
        match serde_yaml::to_string(&played) {
            Ok(yaml) => print!("{}", yaml),
            Err(e) => fail(format!("Error: {}", e)),
        }
        return;
    }

    let bytes = match balimidi::compile(&source, &settings) {
        Ok(bytes) => bytes,
        Err(e) => fail(format!("Compilation error: {}", e)),
    };

    // Output
    let path = output_path
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(input_path).with_extension("mid"));
    if let Err(e) = fs::write(&path, &bytes) {
        fail(format!("Error writing to '{}': {}", path.display(), e));
    }
    eprintln!("Wrote MIDI to {}", path.display());
}
