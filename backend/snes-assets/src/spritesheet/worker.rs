//! Background sprite-sheet analysis where the most recent request wins
//!
//! Every [`AnalysisWorker::submit`] starts a new generation. Work for older generations is skipped
//! if it has not started yet, and any result it still produces is discarded when it arrives.

use crate::spritesheet::{ImportError, ImportResult, ImportSettings, SheetAnalysis, analyze};
use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub enum AnalysisState {
    Idle,
    Analyzing { generation: u64 },
    Ready(Arc<SheetAnalysis>),
}

type AnalysisMessage = (u64, ImportResult<SheetAnalysis>);

pub struct AnalysisWorker {
    latest_generation: Arc<AtomicU64>,
    result_sender: Sender<AnalysisMessage>,
    result_receiver: Receiver<AnalysisMessage>,
    state: AnalysisState,
    last_error: Option<ImportError>,
}

impl Default for AnalysisWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisWorker {
    #[must_use]
    pub fn new() -> Self {
        let (result_sender, result_receiver) = mpsc::channel();
        Self {
            latest_generation: Arc::new(AtomicU64::new(0)),
            result_sender,
            result_receiver,
            state: AnalysisState::Idle,
            last_error: None,
        }
    }

    /// Start analyzing `image` with `settings`, superseding any request still in flight.
    /// Returns the new request's generation.
    pub fn submit(&mut self, image: Arc<RgbaImage>, settings: ImportSettings) -> u64 {
        let generation = self.latest_generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.state = AnalysisState::Analyzing { generation };

        let latest_generation = Arc::clone(&self.latest_generation);
        let result_sender = self.result_sender.clone();
        thread::spawn(move || {
            if latest_generation.load(Ordering::Acquire) != generation {
                log::debug!("Skipping sprite sheet analysis {generation}; it was superseded before starting");
                return;
            }

            let result = analyze(&image, &settings);

            // Receiver is gone if the worker was dropped
            let _ = result_sender.send((generation, result));
        });

        generation
    }

    fn accept(&mut self, (generation, result): AnalysisMessage) {
        let latest = self.latest_generation.load(Ordering::Acquire);
        if generation != latest {
            log::debug!("Discarding sprite sheet analysis {generation}; latest request is {latest}");
            return;
        }

        match result {
            Ok(analysis) => {
                self.state = AnalysisState::Ready(Arc::new(analysis));
                self.last_error = None;
            }
            Err(err) => {
                log::error!("Sprite sheet analysis {generation} failed: {err}");
                self.state = AnalysisState::Idle;
                self.last_error = Some(err);
            }
        }
    }

    /// Apply every result that has arrived without blocking.
    pub fn poll(&mut self) -> &AnalysisState {
        while let Ok(message) = self.result_receiver.try_recv() {
            self.accept(message);
        }

        &self.state
    }

    /// Block until the latest request finishes or `timeout` elapses, whichever comes first.
    pub fn wait_for_latest(&mut self, timeout: Duration) -> &AnalysisState {
        let deadline = Instant::now() + timeout;

        while matches!(self.state, AnalysisState::Analyzing { .. }) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.result_receiver.recv_timeout(remaining) {
                Ok(message) => self.accept(message),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }

        &self.state
    }

    #[must_use]
    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    /// Error from the most recent request, if it failed.
    #[must_use]
    pub fn last_error(&self) -> Option<&ImportError> {
        self.last_error.as_ref()
    }
}
