use std::process::ExitCode;

use anyhow::Result;
use log::*;

use engine::config::RendererConfig;
use engine::Engine;

fn run() -> Result<()> {
    let config = RendererConfig::load_or_default()?;
    let engine = Engine::new(&config)?;
    engine.run()
}

fn main() -> ExitCode {
    pretty_env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
