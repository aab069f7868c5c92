//! Get command - fetch remote packages into the managed workspace root

use anyhow::{bail, Context, Result};
use keel_config::Env;
use keel_package::{FetchMode, FetchResolver, HttpFetcher};

/// Run the get command. Returns false when any fetch failed.
pub fn run(identifiers: &[String], update: bool) -> Result<bool> {
    let env = Env::from_env().context("Failed to resolve environment")?;
    let roots = env.root_set();
    let Some(primary) = roots.primary_workspace() else {
        bail!("no workspace root configured; set KEEL_PATH");
    };

    let resolver = FetchResolver::new(Box::new(HttpFetcher::new()), primary.clone());
    let mode = if update {
        FetchMode::Update
    } else {
        FetchMode::Reuse
    };

    let mut ok = true;
    for identifier in identifiers {
        match resolver.ensure(identifier, mode) {
            Ok(dir) => println!("{} -> {}", identifier, dir.display()),
            Err(e) => {
                eprintln!("keel get: {identifier}: {e}");
                ok = false;
            }
        }
    }
    Ok(ok)
}
