//! Async facade over the synchronous engine.
//!
//! A `Playground` owns a worker thread that owns the engine, so callers
//! get an async-friendly surface without the engine having to be `Send`
//! across awaits. Edits arrive through `submit`, which coalesces them:
//! identical request signatures are suppressed and a trailing debounce
//! timer delays the actual render until the edits go quiet. `render_now`
//! bypasses both. Every issued attempt carries a sequence number; a
//! completion only becomes the observable state while its number is still
//! the latest issued, so a stale attempt can never clobber a newer result.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::engine::PlaygroundEngine;
use crate::error::{Error, Result};
use crate::logs::{LogEntry, LogSink, Logger};
use crate::raster::Rasterizer;
use crate::{PlaygroundConfig, RenderRequest};

/// Observable outcome of the most recent attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RenderState {
    Idle,
    Rendering,
    Done {
        image_uri: String,
        scene_pretty: String,
    },
    Failed {
        message: String,
    },
}

enum Command {
    Render { request: RenderRequest, seq: u64 },
    Close(oneshot::Sender<()>),
}

struct Shared {
    state: Mutex<RenderState>,
    latest_issued: AtomicU64,
    pending_gen: AtomicU64,
    last_sig: Mutex<String>,
    ready: AtomicBool,
}

/// Handle to a running playground session
pub struct Playground {
    cmd_tx: Sender<Command>,
    shared: Arc<Shared>,
    logs: Logger,
    debounce_ms: u64,
}

impl Playground {
    /// Spawn the engine worker and wait for it to come up.
    pub async fn new(
        config: PlaygroundConfig,
        rasterizer: Box<dyn Rasterizer>,
    ) -> Result<Self> {
        let logs = LogSink::shared();
        let debounce_ms = config.debounce_ms;
        let shared = Arc::new(Shared {
            state: Mutex::new(RenderState::Idle),
            latest_issued: AtomicU64::new(0),
            pending_gen: AtomicU64::new(0),
            last_sig: Mutex::new(String::new()),
            ready: AtomicBool::new(false),
        });

        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        let worker_logs = logs.clone();
        let worker_shared = shared.clone();
        thread::spawn(move || {
            let mut engine = match PlaygroundEngine::new(config, rasterizer, worker_logs) {
                Ok(engine) => engine,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Render { request, seq } => {
                        let result = engine.render(&request);
                        // A newer attempt was issued while this one ran:
                        // its side effects are no longer current.
                        if worker_shared.latest_issued.load(Ordering::SeqCst) != seq {
                            log::debug!("dropping stale render attempt #{}", seq);
                            continue;
                        }
                        let state = match result {
                            Ok(output) => RenderState::Done {
                                image_uri: output.image_uri,
                                scene_pretty: output.scene_pretty,
                            },
                            Err(err) => RenderState::Failed {
                                message: err.to_string(),
                            },
                        };
                        if let Ok(mut current) = worker_shared.state.lock() {
                            *current = state;
                        }
                    }
                    Command::Close(ack) => {
                        let _ = ack.send(());
                        break;
                    }
                }
            }
        });

        init_rx
            .await
            .map_err(|e| Error::Initialization(format!("engine worker canceled: {}", e)))??;
        shared.ready.store(true, Ordering::SeqCst);

        Ok(Self {
            cmd_tx,
            shared,
            logs,
            debounce_ms,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    /// Coalescing entry point for edits. Must be called from within a
    /// tokio runtime (the debounce timer is a spawned task). A submit on a
    /// not-ready session is a no-op.
    pub fn submit(&self, request: &RenderRequest) {
        if !self.is_ready() {
            log::debug!("ignoring submit: session not ready");
            return;
        }
        let sig = request.signature();
        {
            let mut last = match self.shared.last_sig.lock() {
                Ok(last) => last,
                Err(_) => return,
            };
            if *last == sig {
                return;
            }
            *last = sig;
        }

        let generation = self.shared.pending_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = self.shared.clone();
        let cmd_tx = self.cmd_tx.clone();
        let request = request.clone();
        let delay = self.debounce_ms;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if shared.pending_gen.load(Ordering::SeqCst) != generation {
                // A newer edit reset the window
                return;
            }
            issue(&shared, &cmd_tx, request);
        });
    }

    /// Manual trigger: skips signature suppression and the debounce timer.
    pub fn render_now(&self, request: &RenderRequest) {
        if !self.is_ready() {
            log::debug!("ignoring render_now: session not ready");
            return;
        }
        issue(&self.shared, &self.cmd_tx, request.clone());
    }

    pub fn state(&self) -> RenderState {
        self.shared
            .state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(RenderState::Idle)
    }

    /// Snapshot of the current render session's log entries
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.snapshot()
    }

    /// Shut down the worker thread.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Close(tx));
        rx.await
            .map_err(|e| Error::Other(format!("close canceled: {}", e)))
    }
}

fn issue(shared: &Arc<Shared>, cmd_tx: &Sender<Command>, request: RenderRequest) {
    let seq = shared.latest_issued.fetch_add(1, Ordering::SeqCst) + 1;
    if let Ok(mut state) = shared.state.lock() {
        *state = RenderState::Rendering;
    }
    let _ = cmd_tx.send(Command::Render { request, seq });
}
