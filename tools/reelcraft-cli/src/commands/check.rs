//! Check external tools and configured resources.

use reelcraft_assembly::subtitle::FontMeasure;
use reelcraft_codec::command_exists;
use reelcraft_common::config::{config_file_path, AppConfig};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Reelcraft System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;
    for tool in ["ffmpeg", "ffprobe"] {
        if command_exists(tool) {
            println!("[OK] {tool} found");
        } else {
            println!("[FAIL] {tool} not found in PATH");
            ready = false;
        }
    }

    let font = config.subtitle.font_spec();
    if !config.subtitle.enabled {
        println!("[OK] Captions disabled");
    } else {
        match FontMeasure::from_spec(&font) {
            Ok(_) => println!("[OK] Caption font: {}", font.path.display()),
            Err(e) => {
                println!("[FAIL] Caption font: {e}");
                ready = false;
            }
        }
    }

    match &config.audio.bgm_dir {
        Some(dir) => {
            let songs = std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .filter(|e| {
                            e.path()
                                .extension()
                                .and_then(|x| x.to_str())
                                .is_some_and(|x| x.eq_ignore_ascii_case("mp3"))
                        })
                        .count()
                })
                .unwrap_or(0);
            if songs > 0 {
                println!("[OK] Background music: {songs} song(s) in {}", dir.display());
            } else {
                println!("[WARN] Background music: no mp3 files in {}", dir.display());
            }
        }
        None => println!("[OK] Background music: not configured"),
    }

    let path = config_file_path();
    if path.exists() {
        println!("[OK] Config: {}", path.display());
    } else {
        println!("[WARN] Config: {} not found, using defaults", path.display());
    }

    println!();
    if ready {
        println!("All required tools are available. Reelcraft is ready.");
    } else {
        println!("Some requirements are missing. See above for details.");
    }
    Ok(())
}
