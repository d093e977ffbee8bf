use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::debug;

use crate::{
    config::{ParserConfig, WatchOptions},
    error::{ConfigError, StartError, WatchError},
    lines::LineAssembler,
    parser::EntryParser,
    record::Record,
    source::{self, ByteStream, Chunk, LogSource, TailMode},
};

/// A notification published by a [`Watcher`].
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Log(Record),
    Error(WatchError),
}

const CHUNK_QUEUE: usize = 32;
const EVENT_QUEUE: usize = 256;

enum SourceSlot {
    File(PathBuf),
    /// Taken at the first start; a stream cannot be re-consumed.
    Stream(Option<ByteStream>),
}

struct Running {
    shutdown: watch::Sender<bool>,
    source_task: JoinHandle<()>,
    pipeline_task: JoinHandle<()>,
}

struct Lifecycle {
    source: SourceSlot,
    running: Option<Running>,
}

/// Tails a log source and publishes a [`WatchEvent`] for every parsed
/// record and every parse or I/O failure.
///
/// Only bytes appended after [`start`](Watcher::start) are observed.
/// `start` is idempotent while running; a watcher that was stopped can be
/// started again with fresh reassembly and retention state.
///
/// ```no_run
/// use logwatch::{ParserConfig, Watcher, WatchEvent, WatchOptions};
/// use regex::Regex;
/// use std::path::Path;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ParserConfig::pattern(
///     Regex::new(r"^(\S+) (.+)$")?,
///     ["level", "msg"],
/// );
/// let watcher = Watcher::new(Path::new("/var/log/sut.log"), config, WatchOptions::default())?;
/// let mut events = watcher.subscribe();
/// watcher.start().await?;
/// while let Ok(WatchEvent::Log(record)) = events.recv().await {
///     println!("{record}");
/// }
/// # Ok(()) }
/// ```
pub struct Watcher {
    parser: Arc<EntryParser>,
    options: WatchOptions,
    events: broadcast::Sender<WatchEvent>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl Watcher {
    pub fn new(
        source: impl Into<LogSource>,
        config: ParserConfig,
        options: WatchOptions,
    ) -> Result<Self, ConfigError> {
        let parser = Arc::new(EntryParser::from_config(config)?);
        let (events, _) = broadcast::channel(EVENT_QUEUE);
        let source = match source.into() {
            LogSource::File(path) => SourceSlot::File(path),
            LogSource::Stream(stream) => SourceSlot::Stream(Some(stream)),
        };
        Ok(Self {
            parser,
            options,
            events,
            lifecycle: tokio::sync::Mutex::new(Lifecycle {
                source,
                running: None,
            }),
        })
    }

    /// Constructs and starts in one call.
    pub async fn started(
        source: impl Into<LogSource>,
        config: ParserConfig,
        options: WatchOptions,
    ) -> Result<Self, StartError> {
        let watcher = Self::new(source, config, options)?;
        watcher.start().await?;
        Ok(watcher)
    }

    /// Subscribes to the notification stream. Subscriptions made before
    /// `start` observe every event.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    /// Begins tailing. Calling `start` on a watcher that is already
    /// running is a no-op; there is never more than one underlying watch.
    pub async fn start(&self) -> Result<(), WatchError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.running.is_some() {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (chunk_tx, chunk_rx) = mpsc::channel::<Chunk>(CHUNK_QUEUE);

        let source_task = match &mut lifecycle.source {
            SourceSlot::File(path) => {
                let state = source::initial_state(path).await?;
                let mode = if self.options.polling {
                    TailMode::Poll {
                        interval: self.options.poll_interval,
                    }
                } else {
                    let (watcher, wake) = source::spawn_dir_watcher(path)?;
                    TailMode::Notify { watcher, wake }
                };
                debug!(path = %path.display(), polling = self.options.polling, "starting file tail");
                tokio::spawn(source::run_file_tail(
                    path.clone(),
                    mode,
                    state,
                    chunk_tx,
                    shutdown_rx.clone(),
                ))
            }
            SourceSlot::Stream(slot) => {
                let stream = slot.take().ok_or(WatchError::SourceExhausted)?;
                tokio::spawn(source::run_stream(stream, chunk_tx, shutdown_rx.clone()))
            }
        };

        let pipeline_task = tokio::spawn(run_pipeline(
            chunk_rx,
            Arc::clone(&self.parser),
            self.options.allow_pattern_violations,
            self.options.retained_log_timeout,
            self.events.clone(),
        ));

        lifecycle.running = Some(Running {
            shutdown: shutdown_tx,
            source_task,
            pipeline_task,
        });
        Ok(())
    }

    /// Detaches the source and waits for the pipeline to drain. A record
    /// still held by the retention policy is emitted before `stop`
    /// returns. Idempotent.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.running.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        let _ = running.source_task.await;
        let _ = running.pipeline_task.await;
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        // tasks hold only channel ends; signalling shutdown lets them wind
        // down without being awaited
        if let Ok(mut lifecycle) = self.lifecycle.try_lock() {
            if let Some(running) = lifecycle.running.take() {
                let _ = running.shutdown.send(true);
            }
        }
    }
}

struct Pipeline {
    assembler: LineAssembler,
    parser: Arc<EntryParser>,
    allow_pattern_violations: bool,
    retained_log_timeout: Duration,
    /// Records produced but not yet emitted; in pattern mode the last one
    /// is held back until the retention deadline passes.
    retained: Vec<Record>,
    deadline: Option<Instant>,
    events: broadcast::Sender<WatchEvent>,
}

/// The single consumer of a watcher's chunk channel. Owning reassembly,
/// parsing, and retention in one task keeps the per-watcher pipeline
/// strictly serial.
async fn run_pipeline(
    mut chunks: mpsc::Receiver<Chunk>,
    parser: Arc<EntryParser>,
    allow_pattern_violations: bool,
    retained_log_timeout: Duration,
    events: broadcast::Sender<WatchEvent>,
) {
    let mut pipeline = Pipeline {
        assembler: LineAssembler::new(),
        parser,
        allow_pattern_violations,
        retained_log_timeout,
        retained: Vec::new(),
        deadline: None,
        events,
    };

    loop {
        let deadline = pipeline.deadline;
        tokio::select! {
            // an expired retention deadline is serviced before a chunk
            // that became ready at the same moment, keeping emission in
            // source order
            biased;
            _ = sleep_until(deadline), if deadline.is_some() => {
                pipeline.flush_retained();
            }
            next = chunks.recv() => match next {
                Some(Ok(chunk)) => pipeline.on_chunk(&chunk),
                Some(Err(err)) => pipeline.emit_error(err),
                None => break,
            },
        }
    }

    // end of input: nothing further can complete a multi-line record
    pipeline.flush_retained();
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Pipeline {
    fn on_chunk(&mut self, chunk: &[u8]) {
        // fresh bytes defer retention: the writer is still active
        self.deadline = None;
        for line in self.assembler.push(chunk) {
            match line {
                Ok(text) => self.on_line(&text),
                Err(err) => self.emit_error(err),
            }
        }
        if !self.retained.is_empty() {
            self.deadline = Some(Instant::now() + self.retained_log_timeout);
        }
    }

    fn on_line(&mut self, line: &str) {
        match self.parser.parse_line(line) {
            Ok(Some(record)) => self.on_record(record),
            Ok(None) => {}
            Err(WatchError::PatternViolation { line })
                if self.allow_pattern_violations && !self.retained.is_empty() =>
            {
                // a continuation line of the record still being written
                if let Some(field) = self.parser.last_field_name() {
                    if let Some(record) = self.retained.last_mut() {
                        record.append_to_field(field, &line);
                    }
                } else {
                    self.emit_error(WatchError::PatternViolation { line });
                }
            }
            Err(err) => self.emit_error(err),
        }
    }

    fn on_record(&mut self, record: Record) {
        if !self.parser.is_pattern() {
            self.emit_log(record);
            return;
        }
        // the newest record may still grow; everything before it is final
        self.retained.push(record);
        while self.retained.len() > 1 {
            let finished = self.retained.remove(0);
            self.emit_log(finished);
        }
    }

    fn flush_retained(&mut self) {
        self.deadline = None;
        for record in std::mem::take(&mut self.retained) {
            self.emit_log(record);
        }
    }

    fn emit_log(&self, record: Record) {
        let _ = self.events.send(WatchEvent::Log(record));
    }

    fn emit_error(&self, err: WatchError) {
        debug!(%err, "parse or I/O failure on watched source");
        let _ = self.events.send(WatchEvent::Error(err));
    }
}
