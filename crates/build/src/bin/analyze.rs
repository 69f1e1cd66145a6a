//! Pipeline analysis tool
//!
//! This binary compiles a single pipeline manifest and prints the resulting register image,
//! signature and decoded command streams as JSON.

use gfx6_pipeline_build::manifest_file_to_report;
use std::env;
use std::path::Path;
use std::process;

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <manifest.yaml>", args[0]);
        eprintln!("Compiles a YAML pipeline manifest and dumps the report to stdout");
        process::exit(1);
    }

    let manifest_path = &args[1];

    if !Path::new(manifest_path).exists() {
        eprintln!("Error: Manifest file '{manifest_path}' does not exist");
        process::exit(1);
    }

    let report = match manifest_file_to_report(manifest_path) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error compiling manifest '{manifest_path}': {e}");
            process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing report: {e}");
            process::exit(1);
        }
    }
}
