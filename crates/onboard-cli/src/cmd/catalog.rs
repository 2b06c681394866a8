use crate::output::{print_json, print_table};
use anyhow::anyhow;
use std::path::Path;

pub fn run(root: &Path, phase: Option<u8>, json: bool) -> anyhow::Result<()> {
    let portal = super::open(root)?;
    let catalog = portal.catalog();

    if let Some(n) = phase {
        let p = catalog
            .phase(n)
            .ok_or_else(|| anyhow!("phase {n} is not in catalog {}", catalog.version))?;
        if json {
            return print_json(p);
        }
        println!("Phase {}: {} ({} days)\n", p.number, p.name, p.duration_days);
        let rows = p
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| {
                vec![
                    (i + 1).to_string(),
                    t.key.clone(),
                    t.name.clone(),
                    t.ownership.clone(),
                    t.prerequisites.join(","),
                ]
            })
            .collect();
        print_table(&["#", "KEY", "NAME", "OWNER", "PREREQUISITES"], rows);
        return Ok(());
    }

    if json {
        return print_json(catalog);
    }
    println!("Catalog {} ({} tasks)\n", catalog.version, catalog.task_count());
    let rows = catalog
        .phases
        .iter()
        .map(|p| {
            vec![
                p.number.to_string(),
                p.name.clone(),
                p.duration_days.to_string(),
                if p.sequential { "yes" } else { "no" }.to_string(),
                p.tasks.len().to_string(),
            ]
        })
        .collect();
    print_table(&["PHASE", "NAME", "DAYS", "SEQUENTIAL", "TASKS"], rows);
    Ok(())
}
