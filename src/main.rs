use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use surface_bridge::{api, BridgeConfig, EngineKind, HostCallbacks, SurfaceId};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();

    let mut headless = false;
    let mut pages = Vec::new();
    let mut scripts = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--headless" => headless = true,
            path if path.ends_with(".html") || path.ends_with(".htm") => {
                pages.push(PathBuf::from(path))
            }
            path => scripts.push(PathBuf::from(path)),
        }
    }
    if pages.is_empty() && scripts.is_empty() {
        bail!("usage: surface_bridge [--headless] <page.html|script.js>...");
    }

    let mut config = BridgeConfig::from_env().context("failed to load bridge config")?;
    if headless {
        config = config.with_engine(EngineKind::Headless);
    }
    let callbacks = HostCallbacks::new()
        .on_js_error(|surface, message| eprintln!("[surface {surface}] {message}"));
    api::init_context(config, callbacks)?;
    let handle = api::create_surface(SurfaceId(1))?;

    for path in &pages {
        let markup = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        api::parse_markup(handle, &markup)?;
    }
    for path in &scripts {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let units: Vec<u16> = source.encode_utf16().collect();
        api::evaluate_script(handle, Some(units.as_slice()), &path.display().to_string(), 1)?;
    }

    let commands = api::take_command_items(handle)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for command in &commands {
        serde_json::to_writer(&mut out, command)?;
        writeln!(out)?;
    }
    info!(count = commands.len(), "commands drained");

    api::dispose_surface(handle)?;
    Ok(())
}
