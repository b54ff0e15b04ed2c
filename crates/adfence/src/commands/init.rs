use adfence_core::config;

/// Writes default `config.toml` and `rules.toml` to `~/.config/adfence/`.
/// Existing files are left alone.
pub fn execute() {
    match config::write_defaults() {
        Ok(written) => {
            if written.is_empty() {
                println!("Config files already exist, nothing written.");
            }
            for path in &written {
                println!("Created {}", path.display());
            }
            if let Some(dir) = config::config_dir() {
                println!("\nEdit the files in {} to tune blocking.", dir.display());
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
