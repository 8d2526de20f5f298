use distrocache_core::{model::set_name, SetInfo, Store};
use nu_ansi_term::Color::{Blue, Cyan, Green, LightRed};
use tracing::info;

use crate::{
    error::{CliError, CliResult},
    utils::Colored,
};

fn describe(set: &SetInfo) -> String {
    match set.last_updated {
        None => format!("{}", Colored(Green, "frozen")),
        Some(updated) => {
            format!(
                "{} {}",
                Colored(LightRed, "floating"),
                updated.format("%Y-%m-%d %H:%M:%S UTC")
            )
        }
    }
}

pub fn list_sets(store: &Store, distribution: Option<&str>, json: bool) -> CliResult<()> {
    let sets = store.list_sets(distribution)?;

    if json {
        let document =
            serde_json::to_string_pretty(&sets).map_err(|e| CliError::Encode(e.to_string()))?;
        println!("{document}");
        return Ok(());
    }

    if sets.is_empty() {
        info!("No sets stored");
        return Ok(());
    }

    for set in &sets {
        info!(
            "{}/{} | {}",
            Colored(Blue, &set.distribution),
            Colored(Cyan, &set.name),
            describe(set)
        );
    }
    info!("{} sets", sets.len());
    Ok(())
}

/// Removes a stored set. `name` may be given as a full ref like
/// `refs/heads/humble`.
pub fn drop_set(store: &Store, distribution: &str, name: &str) -> CliResult<()> {
    let name = set_name(name);
    if !store.delete_set(distribution, name)? {
        return Err(CliError::NoSuchSet {
            distribution: distribution.to_string(),
            name: name.to_string(),
        });
    }
    info!(
        "Removed set {}/{}; its repository states remain cached",
        distribution, name
    );
    Ok(())
}
