use std::sync::{Arc, Mutex};

use tokio::{
    sync::{broadcast, oneshot},
    task::JoinHandle,
    time,
};
use tracing::warn;

use crate::{
    config::{ParserConfig, WaitOptions, WatchOptions},
    error::{ConfigError, StartError, WaitError, WatchError},
    record::Record,
    source::LogSource,
    template::Template,
    watcher::{WatchEvent, Watcher},
};

struct Waiter {
    id: u64,
    template: Template,
    strict: bool,
    completion: oneshot::Sender<Result<Record, WaitError>>,
}

#[derive(Default)]
struct ReaderState {
    records: Vec<Record>,
    errors: Vec<WatchError>,
    waiters: Vec<Waiter>,
    next_waiter_id: u64,
}

struct Dispatch {
    task: JoinHandle<()>,
    quit: oneshot::Sender<()>,
}

/// Wraps a [`Watcher`] with record/error buffers and a match-wait
/// primitive for test assertions.
///
/// ```no_run
/// use logwatch::{LogReader, ParserConfig, Template, WaitOptions, WatchOptions};
/// use std::path::Path;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let reader = LogReader::started(
///     Path::new("/var/log/sut.log"),
///     ParserConfig::json(),
///     WatchOptions::default(),
/// )
/// .await?;
/// let record = reader
///     .wait_for_match(&Template::new().field("level", "error"), WaitOptions::default())
///     .await?;
/// println!("matched: {record}");
/// # Ok(()) }
/// ```
pub struct LogReader {
    watcher: Watcher,
    state: Arc<Mutex<ReaderState>>,
    dispatch: tokio::sync::Mutex<Option<Dispatch>>,
}

impl LogReader {
    pub fn new(
        source: impl Into<LogSource>,
        config: ParserConfig,
        options: WatchOptions,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            watcher: Watcher::new(source, config, options)?,
            state: Arc::new(Mutex::new(ReaderState::default())),
            dispatch: tokio::sync::Mutex::new(None),
        })
    }

    /// Constructs and starts in one call.
    pub async fn started(
        source: impl Into<LogSource>,
        config: ParserConfig,
        options: WatchOptions,
    ) -> Result<Self, StartError> {
        let reader = Self::new(source, config, options)?;
        reader.start().await?;
        Ok(reader)
    }

    /// Stops any previous run, clears both buffers, and begins observing.
    pub async fn start(&self) -> Result<(), WatchError> {
        let mut dispatch = self.dispatch.lock().await;
        halt(&self.watcher, &self.state, &mut dispatch).await;

        {
            let mut state = self.state.lock().expect("reader state poisoned");
            state.records.clear();
            state.errors.clear();
        }

        let events = self.watcher.subscribe();
        self.watcher.start().await?;

        let state = Arc::clone(&self.state);
        let (quit_tx, quit_rx) = oneshot::channel();
        let task = tokio::spawn(dispatch_events(events, state, quit_rx));
        *dispatch = Some(Dispatch {
            task,
            quit: quit_tx,
        });
        Ok(())
    }

    /// Stops the watcher and fails any in-flight waiter with
    /// [`WaitError::Stopped`]. Idempotent.
    pub async fn stop(&self) {
        let mut dispatch = self.dispatch.lock().await;
        halt(&self.watcher, &self.state, &mut dispatch).await;
    }

    /// Snapshot of every record observed since the last `start`.
    pub fn records(&self) -> Vec<Record> {
        self.state.lock().expect("reader state poisoned").records.clone()
    }

    /// Snapshot of every parse and I/O error observed since the last `start`.
    pub fn errors(&self) -> Vec<WatchError> {
        self.state.lock().expect("reader state poisoned").errors.clone()
    }

    /// Waits until a record matching `template` arrives, or fails with the
    /// first of: buffered upstream errors, a strict-mode mismatch, the
    /// deadline, or the reader stopping. The completion is single-shot and
    /// all waiter resources are released on every exit path.
    pub async fn wait_for_match(
        &self,
        template: &Template,
        options: WaitOptions,
    ) -> Result<Record, WaitError> {
        let (id, completion) = {
            let mut state = self.state.lock().expect("reader state poisoned");

            if !state.errors.is_empty() {
                return Err(WaitError::Upstream {
                    details: aggregate_errors(&state.errors),
                });
            }

            if options.strict {
                if let Some(first) = state.records.first() {
                    return if template.matches(first) {
                        Ok(first.clone())
                    } else {
                        Err(WaitError::UnexpectedRecord {
                            record: first.clone(),
                        })
                    };
                }
            } else if let Some(found) = state.records.iter().find(|record| template.matches(record))
            {
                return Ok(found.clone());
            }

            // registered under the same lock the dispatcher takes, so no
            // record can land between the scan above and this point
            let (tx, rx) = oneshot::channel();
            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            state.waiters.push(Waiter {
                id,
                template: template.clone(),
                strict: options.strict,
                completion: tx,
            });
            (id, rx)
        };

        match time::timeout(options.timeout, completion).await {
            Ok(Ok(outcome)) => outcome,
            // the waiter registry was torn down without completing us
            Ok(Err(_)) => Err(WaitError::Stopped),
            Err(_) => {
                let mut state = self.state.lock().expect("reader state poisoned");
                state.waiters.retain(|waiter| waiter.id != id);
                Err(WaitError::Timeout {
                    timeout: options.timeout,
                    records: state.records.clone(),
                })
            }
        }
    }
}

/// Stops the watcher first so the pipeline's final events (including a
/// flushed retained record) are already buffered, then lets the dispatch
/// task drain them before exiting, and finally fails leftover waiters.
async fn halt(
    watcher: &Watcher,
    state: &Arc<Mutex<ReaderState>>,
    dispatch: &mut Option<Dispatch>,
) {
    watcher.stop().await;
    if let Some(Dispatch { task, quit }) = dispatch.take() {
        let _ = quit.send(());
        let _ = task.await;
    }
    let waiters = {
        let mut state = state.lock().expect("reader state poisoned");
        std::mem::take(&mut state.waiters)
    };
    for waiter in waiters {
        let _ = waiter.completion.send(Err(WaitError::Stopped));
    }
}

async fn dispatch_events(
    mut events: broadcast::Receiver<WatchEvent>,
    state: Arc<Mutex<ReaderState>>,
    mut quit: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => handle_event(&state, event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "reader fell behind the notification stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut quit => {
                // the watcher has already stopped; drain what it buffered
                loop {
                    match events.try_recv() {
                        Ok(event) => handle_event(&state, event),
                        Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                            warn!(missed, "reader fell behind the notification stream");
                        }
                        Err(_) => break,
                    }
                }
                break;
            }
        }
    }
}

fn handle_event(state: &Mutex<ReaderState>, event: WatchEvent) {
    let mut state = state.lock().expect("reader state poisoned");
    match event {
        WatchEvent::Log(record) => {
            state.records.push(record.clone());
            let waiters = std::mem::take(&mut state.waiters);
            for waiter in waiters {
                if waiter.template.matches(&record) {
                    let _ = waiter.completion.send(Ok(record.clone()));
                } else if waiter.strict {
                    let _ = waiter.completion.send(Err(WaitError::UnexpectedRecord {
                        record: record.clone(),
                    }));
                } else {
                    state.waiters.push(waiter);
                }
            }
        }
        WatchEvent::Error(err) => {
            state.errors.push(err.clone());
            let waiters = std::mem::take(&mut state.waiters);
            for waiter in waiters {
                let _ = waiter.completion.send(Err(WaitError::Upstream {
                    details: err.detailed_message(),
                }));
            }
        }
    }
}

fn aggregate_errors(errors: &[WatchError]) -> String {
    errors
        .iter()
        .map(WatchError::detailed_message)
        .collect::<Vec<_>>()
        .join("\n")
}
