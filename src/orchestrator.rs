//! Source enumeration, worker startup, the aggregation loop and bounded
//! shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::camera::CaptureBackend;
use crate::config::Config;
use crate::engine::EngineFactory;
use crate::logging::Logger;
use crate::render::Presenter;
use crate::session::Session;
use crate::transport::SourceEndpoints;
use crate::worker::{CameraWorker, WorkerExit, WorkerOptions};
use crate::{log, vlog};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no capture sources found (probed {0} indices)")]
    NoSources(usize),
}

/// 各 worker の終了結果
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// join できた worker の id
    pub joined: Vec<usize>,
    /// タイムアウトまでに終わらなかった worker の id
    pub timed_out: Vec<usize>,
    pub exits: Vec<(usize, WorkerExit)>,
}

impl ShutdownReport {
    pub fn exit_of(&self, id: usize) -> Option<&WorkerExit> {
        self.exits.iter().find(|(i, _)| *i == id).map(|(_, e)| e)
    }
}

struct RunningWorker {
    session: Session,
    handle: JoinHandle<WorkerExit>,
}

pub struct Orchestrator {
    config: Config,
    backend: Arc<dyn CaptureBackend>,
    engines: Arc<dyn EngineFactory>,
    logger: Logger,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        backend: Arc<dyn CaptureBackend>,
        engines: Arc<dyn EngineFactory>,
        logger: Logger,
    ) -> Self {
        Self {
            config,
            backend,
            engines,
            logger,
        }
    }

    /// Sessions in enumeration order; endpoints follow the position, not the
    /// device index.
    pub fn sessions(&self) -> Result<Vec<Session>> {
        let max = self.config.capture.max_sources;
        let ids = self.backend.enumerate(max);
        if ids.is_empty() {
            return Err(OrchestratorError::NoSources(max).into());
        }

        let net = &self.config.network;
        let preview_offset = net.preview.then_some(net.preview_port_offset);
        ids.into_iter()
            .take(max)
            .enumerate()
            .map(|(position, id)| {
                let endpoints = SourceEndpoints::for_index(
                    &net.host,
                    net.base_port,
                    position,
                    net.mask_port_offset,
                    preview_offset,
                )
                .with_context(|| format!("endpoints for source {}", id))?;
                Ok(Session::new(id, endpoints))
            })
            .collect()
    }

    /// Runs until `stop` is set, the presenter asks to close or every worker
    /// has exited, then joins the rest within `shutdown.join_timeout_ms`.
    pub fn run(&self, presenter: &mut dyn Presenter, stop: Arc<AtomicBool>) -> Result<ShutdownReport> {
        let sessions = self.sessions()?;
        log!(self.logger, "[orchestrator] {} source(s)", sessions.len());

        let options = WorkerOptions::from_config(&self.config);
        let mut workers = Vec::with_capacity(sessions.len());
        for session in sessions {
            log!(
                self.logger,
                "[cam{}] label -> {}, mask -> {}",
                session.id,
                session.endpoints.label,
                session.endpoints.mask
            );
            let worker = CameraWorker::new(
                session.clone(),
                Arc::clone(&self.backend),
                Arc::clone(&self.engines),
                options.clone(),
                Arc::clone(&stop),
                self.logger.clone(),
            );
            let handle = thread::Builder::new()
                .name(format!("cam{}", session.id))
                .spawn(move || worker.run())
                .with_context(|| format!("failed to spawn worker for cam{}", session.id))?;
            workers.push(RunningWorker { session, handle });
        }

        let poll = Duration::from_millis(self.config.shutdown.poll_interval_ms.max(1));
        let mut report = ShutdownReport::default();
        loop {
            if stop.load(Ordering::Relaxed) {
                log!(self.logger, "[orchestrator] stop requested");
                break;
            }

            // 終了した worker はここで回収し、以後そのセッションは表示しない
            let (finished, live): (Vec<_>, Vec<_>) =
                workers.into_iter().partition(|w| w.handle.is_finished());
            workers = live;
            for w in finished {
                self.record_join(w, &mut report);
            }
            if workers.is_empty() {
                log!(self.logger, "[orchestrator] no live workers remain");
                break;
            }

            for w in &workers {
                if w.session.cell().is_closed() {
                    continue;
                }
                if let Some((display, _mask)) = w.session.cell().get_display() {
                    if let Err(e) = presenter.present(w.session.id, &display) {
                        log!(self.logger, "[display] cam{}: {:#}", w.session.id, e);
                    }
                }
            }
            if presenter.close_requested() {
                log!(self.logger, "[orchestrator] display closed");
                break;
            }
            thread::sleep(poll);
        }

        stop.store(true, Ordering::Relaxed);
        self.join_all(workers, &mut report);
        report.joined.sort_unstable();
        report.timed_out.sort_unstable();
        report.exits.sort_by_key(|(id, _)| *id);
        log!(
            self.logger,
            "[orchestrator] shutdown: {} joined, {} timed out",
            report.joined.len(),
            report.timed_out.len()
        );
        Ok(report)
    }

    fn join_all(&self, workers: Vec<RunningWorker>, report: &mut ShutdownReport) {
        let timeout = Duration::from_millis(self.config.shutdown.join_timeout_ms);
        let poll = Duration::from_millis(self.config.shutdown.poll_interval_ms.max(1));

        for w in workers {
            let id = w.session.id;
            let deadline = Instant::now() + timeout;
            while !w.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(poll);
            }
            if !w.handle.is_finished() {
                // 取り残されたスレッドはプロセス終了時に破棄される
                log!(self.logger, "[cam{}] did not stop within {:?}", id, timeout);
                report.timed_out.push(id);
                continue;
            }
            self.record_join(w, report);
        }
    }

    /// Joins a finished worker and drops its session.
    fn record_join(&self, w: RunningWorker, report: &mut ShutdownReport) {
        let id = w.session.id;
        let exit = match w.handle.join() {
            Ok(exit) => exit,
            Err(_) => {
                log!(self.logger, "[cam{}] worker panicked", id);
                WorkerExit::CaptureFailed("worker panicked".to_string())
            }
        };
        vlog!(self.logger, "[cam{}] joined ({:?})", id, exit);
        report.joined.push(id);
        report.exits.push((id, exit));
    }
}
