use super::exit_codes;
use crate::cli::args::InitArgs;
use calibra_core::config::write_sample_config;
use std::path::Path;

pub fn cmd_init(config: &Path, args: &InitArgs) -> anyhow::Result<i32> {
    if config.exists() && !args.force {
        eprintln!(
            "⚠️  {} already exists, skipping (use --force to overwrite).",
            config.display()
        );
        return Ok(exit_codes::OK);
    }
    write_sample_config(config)?;
    eprintln!("✅ Wrote {}", config.display());
    eprintln!("   Next: calibra dataset create --name my-dataset");
    Ok(exit_codes::OK)
}
