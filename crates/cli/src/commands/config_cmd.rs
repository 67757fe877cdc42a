//! `aspectflow config` — Configuration management commands.

use aspectflow_config::AppConfig;

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.evaluation.detect_cycles {
                warnings.push("Cycle detection is off; self-returning graphs stop only at max_depth");
            }

            if config.evaluation.max_depth > 10_000 {
                warnings.push("max_depth above 10000 may overflow the stack before the limit is hit");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Max depth: {}", config.evaluation.max_depth);
            println!("   Cycles:    {}", if config.evaluation.detect_cycles { "detected" } else { "not detected" });
            println!("   Cache:     {}", if config.cache.enabled { "enabled" } else { "scoped per run" });
            println!("   Log level: {}", config.logging.level);
            println!("   Presets:   {}", config.defaults.len());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}
