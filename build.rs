// Build script for the Anubis companion server
// Copies the sample settings file next to the built binary

use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Tell Cargo to rerun this script if the settings file changes
    println!("cargo:rerun-if-changed=anubis.toml");

    let out_dir = env::var("OUT_DIR").unwrap();

    // OUT_DIR = target/<profile>/build/<crate>-<hash>/out
    let out_path = Path::new(&out_dir);
    let target_dir = out_path
        .ancestors()
        .nth(3)
        .expect("Could not find target directory");

    let settings_src = Path::new("anubis.toml");
    let settings_dst = target_dir.join("anubis.toml");

    if settings_src.exists() && !settings_dst.exists() {
        fs::copy(settings_src, &settings_dst).expect("Failed to copy settings file");
        println!(
            "cargo:warning=Copied settings file to {}",
            settings_dst.display()
        );
    }
}
