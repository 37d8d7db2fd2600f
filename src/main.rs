use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use posecast::camera::OpenCvBackend;
use posecast::config::Config;
use posecast::engine::OnnxEngineFactory;
use posecast::log;
use posecast::logging::Logger;
use posecast::orchestrator::{Orchestrator, OrchestratorError};
use posecast::render::MinifbPresenter;

const CONFIG_PATH: &str = "posecast.toml";

fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&path);
    let logger = match Logger::open(&config.log.dir, config.log.verbose) {
        Ok((logger, _)) => logger,
        Err(e) => {
            eprintln!("[log] {:#}, logging to stderr only", e);
            Logger::stderr().with_verbose(config.log.verbose)
        }
    };
    log!(logger, "posecast ({})", env!("GIT_VERSION"));
    log!(
        logger,
        "[config] host={}, base_port={}, max_sources={}, model={}",
        config.network.host,
        config.network.base_port,
        config.capture.max_sources,
        config.engine.model
    );

    let stop = Arc::new(AtomicBool::new(false));

    // SIGINT / SIGTERM → stop flag（即時終了はしない）
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&stop))?;

    // Console input thread: 'q' + Enter → stop
    {
        let flag = Arc::clone(&stop);
        let logger = logger.clone();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) if line.trim() == "q" => {
                        log!(logger, "[input] quit requested");
                        flag.store(true, Ordering::Relaxed);
                        break;
                    }
                    Ok(_) => {}
                }
            }
        });
    }

    let backend = Arc::new(OpenCvBackend::new(&config.capture));
    let engines = Arc::new(OnnxEngineFactory::new(config.engine.clone(), logger.clone()));
    let orchestrator = Orchestrator::new(config, backend, engines, logger.clone());
    let mut presenter = MinifbPresenter::new();

    match orchestrator.run(&mut presenter, stop) {
        Ok(report) => {
            for (id, exit) in &report.exits {
                log!(logger, "[cam{}] {:?}", id, exit);
            }
            Ok(())
        }
        Err(e) => {
            log!(logger, "{:#}", e);
            if e.downcast_ref::<OrchestratorError>().is_some() {
                std::process::exit(1);
            }
            Err(e)
        }
    }
}
