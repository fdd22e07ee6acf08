use crate::output::{print_json, print_table};
use anyhow::Context;
use astar_core::Config;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(config_path).context("failed to load config")?;
    let hierarchy = config.role_hierarchy().context("invalid role definitions")?;

    let mut rows = Vec::new();
    let mut entries = Vec::new();
    for name in hierarchy.names() {
        let Some(def) = hierarchy.get(name) else { continue };
        let permissions = hierarchy
            .effective(name)
            .map(|set| set.to_strings())
            .unwrap_or_default();
        rows.push(vec![
            name.to_string(),
            def.parent.clone().unwrap_or_else(|| "-".into()),
            permissions.join(" "),
        ]);
        entries.push(serde_json::json!({
            "name": name,
            "display_name": def.display_name,
            "parent": def.parent,
            "permissions": permissions,
        }));
    }

    if json {
        print_json(&entries)?;
    } else {
        print_table(&["ROLE", "PARENT", "PERMISSIONS"], rows);
    }
    Ok(())
}
