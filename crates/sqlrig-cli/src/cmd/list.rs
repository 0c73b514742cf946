use crate::output::{print_json, print_table};
use sqlrig_core::builtin::register_defaults;
use sqlrig_core::registry::{Registry, RegistryBuilder};
use std::path::Path;

/// The registry every command runs against: the stock actions.
pub fn default_registry() -> anyhow::Result<Registry> {
    let mut builder = RegistryBuilder::new();
    register_defaults(&mut builder)?;
    Ok(builder.build())
}

pub fn run(_root: &Path, json: bool) -> anyhow::Result<()> {
    let registry = default_registry()?;

    if json {
        let list: Vec<_> = registry
            .list_all()
            .map(|(name, description)| {
                let action = registry.get(name);
                serde_json::json!({
                    "name": name,
                    "description": description,
                    "modifies_state": action.is_some_and(|a| a.modifies_state()),
                    "dependencies": action.map(|a| a.dependencies().clone()).unwrap_or_default(),
                })
            })
            .collect();
        return print_json(&list);
    }

    if registry.is_empty() {
        println!("No actions defined.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = registry
        .list_all()
        .map(|(name, description)| vec![name.to_string(), description.to_string()])
        .collect();
    print_table(&["ACTION", "DESCRIPTION"], &rows);
    Ok(())
}
