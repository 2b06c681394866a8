use anyhow::Context;
use onboard_core::{catalog::Catalog, config::Config, io, paths, Portal};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>, json: bool) -> anyhow::Result<()> {
    let name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onboarding".to_string())
    });

    let config_path = paths::config_path(root);
    let config_created = if config_path.exists() {
        false
    } else {
        Config::new(&name)
            .save(root)
            .context("failed to write config.yaml")?;
        true
    };
    let config = Config::load(root).context("failed to read config.yaml")?;

    let catalog_path = config.catalog_path(root);
    let catalog_created = io::write_if_missing(&catalog_path, Catalog::builtin_yaml().as_bytes())
        .with_context(|| format!("failed to write {}", catalog_path.display()))?;

    // Opening creates the database file and its tables.
    Portal::open(root).context("failed to open portal database")?;

    let warnings = config.validate();
    for w in &warnings {
        tracing::warn!("{}", w.message);
    }

    if json {
        crate::output::print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "config_created": config_created,
            "catalog_created": catalog_created,
            "warnings": warnings,
        }))?;
        return Ok(());
    }

    println!("Initializing onboarding portal in: {}", root.display());
    let mark = |created: bool| if created { "created:" } else { "exists: " };
    println!("  {} {}", mark(config_created), paths::CONFIG_FILE);
    println!(
        "  {} {}",
        mark(catalog_created),
        catalog_path
            .strip_prefix(root)
            .unwrap_or(&catalog_path)
            .display()
    );
    println!("\nNext: onboard project create --name <name> --environment dev --phases 1");
    Ok(())
}
