//! Env command - print the effective configuration

use anyhow::{Context, Result};
use keel_config::Env;

pub fn run() -> Result<bool> {
    let env = Env::from_env().context("Failed to resolve environment")?;
    for (name, value) in env.variables() {
        println!("{name}=\"{value}\"");
    }
    Ok(true)
}
