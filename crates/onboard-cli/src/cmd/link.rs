use crate::output::{print_fields, print_json};
use std::path::Path;

pub fn run(root: &Path, action_id: u64, json: bool) -> anyhow::Result<()> {
    let portal = super::open(root)?;
    let link = portal.build_action_link(action_id)?;
    if json {
        return print_json(&link);
    }
    if link.unresolved.is_empty() {
        println!("{}", link.url);
    } else {
        print_fields(&[
            ("label", link.label.clone()),
            ("url", link.url.clone()),
            ("unresolved", link.unresolved.join(", ")),
        ]);
    }
    Ok(())
}
