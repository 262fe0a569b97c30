//! Console rendering of the loaded catalog and workbench.

use std::collections::HashSet;

use terria::catalog::GroupModel;
use terria::{ModelRef, Terria};

/// Prints the catalog tree, the workbench and the base maps.
pub fn print_summary(terria: &Terria) {
    println!("Catalog");
    println!("=======");
    let root = terria.catalog().group();
    let mut visited = HashSet::new();
    for member in root.member_models() {
        print_tree(&member, 1, &mut visited);
    }
    println!();

    println!("Workbench");
    println!("=========");
    let items = terria.workbench().items();
    if items.is_empty() {
        println!("  (empty)");
    }
    for (index, item) in items.iter().enumerate() {
        println!("  {}. {}", index + 1, describe(item));
    }
    println!();

    let base_maps = terria.base_maps();
    println!("Base maps: {}", base_maps.len());
    for base_map in &base_maps {
        println!("  - {}", describe(&base_map.mappable));
    }
    println!("Models registered: {}", terria.registry().len());
}

fn describe(model: &ModelRef) -> String {
    format!(
        "{} [{}] ({})",
        model.display_name(),
        model.type_name(),
        model.unique_id().unwrap_or("anonymous")
    )
}

fn print_tree(model: &ModelRef, depth: usize, visited: &mut HashSet<String>) {
    println!("{}{}", "  ".repeat(depth), describe(model));

    let Some(id) = model.unique_id() else {
        return;
    };
    // Groups can list each other as members.
    if !visited.insert(id.to_string()) {
        return;
    }
    if let Some(group) = GroupModel::new(model.clone()) {
        for member in group.member_models() {
            print_tree(&member, depth + 1, visited);
        }
    }
}
