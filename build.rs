// build.rs

use std::path::Path;
use std::process::Command;

const SHADERS: &[(&str, &str)] = &[
    ("shaders/shader.vert", "shaders/vert.spv"),
    ("shaders/shader.frag", "shaders/frag.spv"),
];

fn main() {
    for (source, output) in SHADERS {
        println!("cargo::rerun-if-changed={}", source);

        if !Path::new(source).exists() {
            continue;
        }

        match Command::new("glslc").args([*source, "-o", *output]).status() {
            Err(err) => {
                // Existing .spv files are used as-is.
                println!("cargo::warning=glslc unavailable ({}), skipping {}", err, source);
            }
            Ok(status) if !status.success() => {
                println!("cargo::warning=glslc failed for {}: {}", source, status);
            }
            Ok(_) => {}
        }
    }
}
