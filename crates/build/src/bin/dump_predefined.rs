//! Predefined pipeline dumping tool
//!
//! This binary compiles every predefined pipeline manifest and dumps the reports to a
//! single JSON file keyed by pipeline name.

use gfx6_pipeline_build::{manifest_file_to_report, predefined::PREDEFINED_MANIFESTS};
use std::{collections::BTreeMap, env, fs, path::Path, process};

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 3 {
        eprintln!("Usage: {} <project_root> <output_file>", args[0]);
        eprintln!("Compiles all predefined pipelines and dumps their reports to a JSON file");
        eprintln!("  project_root: Path to the project root containing manifests/");
        eprintln!("  output_file:  Path to the output JSON file");
        process::exit(1);
    }

    let project_root = Path::new(&args[1]);
    let output_file = &args[2];

    if !project_root.exists() {
        eprintln!("Error: Project root '{}' does not exist", project_root.display());
        process::exit(1);
    }

    let mut reports = BTreeMap::new();
    for (name, path) in PREDEFINED_MANIFESTS {
        println!("Processing pipeline: {name} ({path})");
        match manifest_file_to_report(project_root.join(path)) {
            Ok(report) => {
                reports.insert(*name, report);
            }
            Err(e) => {
                eprintln!("Error compiling pipeline '{name}': {e}");
                process::exit(1);
            }
        }
    }

    match serde_json::to_string_pretty(&reports) {
        Ok(json) => {
            if let Err(e) = fs::write(output_file, json) {
                eprintln!("Error writing output file '{output_file}': {e}");
                process::exit(1);
            }
            println!("Successfully wrote {} pipelines to '{}'", reports.len(), output_file);
        }
        Err(e) => {
            eprintln!("Error serializing reports to JSON: {e}");
            process::exit(1);
        }
    }
}
