use anyhow::Context;
use sqlrig_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let project_name = match name {
        Some(n) => n.to_string(),
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string()),
    };

    println!("Initializing sqlrig in: {}", root.display());

    for dir in paths::SCAFFOLD_DIRS {
        let p = root.join(dir);
        if p.is_dir() {
            println!("  exists:  {dir}/");
        } else {
            io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
            println!("  created: {dir}/");
        }
    }

    let config_path = paths::config_path(root);
    let yaml = serde_yaml::to_string(&Config::new(&project_name))?;
    let written = io::write_if_missing(&config_path, yaml.as_bytes())
        .with_context(|| format!("failed to write {}", paths::CONFIG_FILE))?;
    if written {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    println!("\nsqlrig initialized for project '{project_name}'.");
    println!("Next: put scripts under {}/ and run 'sqlrig complete-build'", paths::DATABASE_DIR);
    Ok(())
}
