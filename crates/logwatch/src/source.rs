use std::{
    fmt, io,
    io::SeekFrom,
    ops::ControlFlow,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{
    fs,
    io::{AsyncRead, AsyncReadExt, AsyncSeekExt},
    sync::{mpsc, watch},
    time,
};
use tracing::debug;

use crate::error::WatchError;

/// A boxed reader used for stream sources (a child process's stdout, a
/// pipe, an in-memory duplex in tests).
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Where a [`Watcher`](crate::Watcher) reads from.
pub enum LogSource {
    /// A file on disk, which need not exist yet; only bytes appended after
    /// the watcher starts are observed.
    File(PathBuf),
    /// A live byte stream, consumed from its current position to EOF.
    Stream(ByteStream),
}

impl LogSource {
    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Stream(Box::new(reader))
    }
}

impl fmt::Debug for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<PathBuf> for LogSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl From<&Path> for LogSource {
    fn from(path: &Path) -> Self {
        Self::File(path.to_path_buf())
    }
}

impl From<ByteStream> for LogSource {
    fn from(stream: ByteStream) -> Self {
        Self::Stream(stream)
    }
}

pub(crate) type Chunk = Result<Vec<u8>, WatchError>;
pub(crate) type ChunkSender = mpsc::Sender<Chunk>;

const WAKE_QUEUE: usize = 16;
const STREAM_CHUNK_BYTES: usize = 4096;

/// How long to wait for change notifications before re-statting anyway.
/// Notification delivery is best-effort on some filesystems.
const FALLBACK_RESTAT: Duration = Duration::from_secs(2);

/// Offset bookkeeping for one tailed file.
///
/// The watch layer may report duplicate or overlapping ranges; the plan
/// clamps the next read to start no earlier than the last observed size,
/// so every appended byte is read exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FileTailState {
    prev_size: u64,
    last_observed_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TailPlan {
    Skip,
    Read { from: u64, to: u64 },
}

impl FileTailState {
    pub(crate) fn starting_at(size: u64) -> Self {
        Self {
            prev_size: size,
            last_observed_size: size,
        }
    }

    /// Decides the read range for a wake that observed `curr` bytes.
    pub(crate) fn plan(&mut self, curr: u64) -> TailPlan {
        if curr < self.last_observed_size {
            // The file shrank below what was already read: rotation or
            // truncation. Start over from the top of the new file.
            debug!(curr, last_observed = self.last_observed_size, "file shrank, re-reading from start");
            self.prev_size = 0;
            self.last_observed_size = 0;
        }
        self.prev_size = self.prev_size.max(self.last_observed_size);
        if self.prev_size >= curr {
            return TailPlan::Skip;
        }
        TailPlan::Read {
            from: self.prev_size,
            to: curr,
        }
    }

    pub(crate) fn mark_read(&mut self, to: u64) {
        self.prev_size = to;
        self.last_observed_size = to;
    }
}

/// Stats the file once so only bytes appended after this point are read.
/// A file that does not exist yet starts at offset zero.
pub(crate) async fn initial_state(path: &Path) -> Result<FileTailState, WatchError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(FileTailState::starting_at(meta.len())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(FileTailState::default()),
        Err(err) => Err(WatchError::from_io("stat", path, &err)),
    }
}

/// Registers a non-recursive watch on the file's parent directory, so a
/// file that does not exist yet is still detected when it is created.
/// Events fold into a small wake channel drained by the tail loop.
pub(crate) fn spawn_dir_watcher(
    path: &Path,
) -> Result<(notify::RecommendedWatcher, mpsc::Receiver<()>), WatchError> {
    use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

    let (wake_tx, wake_rx) = mpsc::channel::<()>(WAKE_QUEUE);
    let mut watcher: RecommendedWatcher = Watcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    let _ = wake_tx.try_send(());
                }
            }
        },
        Config::default(),
    )
    .map_err(|err| WatchError::watch_setup(path, &err))?;

    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    watcher
        .watch(parent, RecursiveMode::NonRecursive)
        .map_err(|err| WatchError::watch_setup(parent, &err))?;

    Ok((watcher, wake_rx))
}

pub(crate) enum TailMode {
    /// Keeps the directory watch registration alive for the task's lifetime.
    Notify {
        watcher: notify::RecommendedWatcher,
        wake: mpsc::Receiver<()>,
    },
    Poll { interval: Duration },
}

/// Tails a file until shutdown, delivering each newly appended range as
/// one chunk.
pub(crate) async fn run_file_tail(
    path: PathBuf,
    mode: TailMode,
    mut state: FileTailState,
    chunks: ChunkSender,
    mut shutdown: watch::Receiver<bool>,
) {
    match mode {
        TailMode::Poll { interval } => {
            let mut tick = time::interval(interval);
            tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if poll_once(&path, &mut state, &chunks).await.is_break() {
                            return;
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        }
        TailMode::Notify {
            watcher: _watcher,
            mut wake,
        } => loop {
            tokio::select! {
                _ = wake.recv() => {
                    // coalesce bursts of directory events into one re-stat
                    while wake.try_recv().is_ok() {}
                    if poll_once(&path, &mut state, &chunks).await.is_break() {
                        return;
                    }
                }
                _ = time::sleep(FALLBACK_RESTAT) => {
                    if poll_once(&path, &mut state, &chunks).await.is_break() {
                        return;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        },
    }
}

/// One re-stat plus (when the file grew) one ranged read. Absence is not
/// an error; other failures are delivered downstream and tailing goes on.
async fn poll_once(
    path: &Path,
    state: &mut FileTailState,
    chunks: &ChunkSender,
) -> ControlFlow<()> {
    let curr = match fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return ControlFlow::Continue(()),
        Err(err) => {
            return deliver(chunks, Err(WatchError::from_io("stat", path, &err))).await;
        }
    };

    let TailPlan::Read { from, to } = state.plan(curr) else {
        return ControlFlow::Continue(());
    };
    match read_range(path, from, to).await {
        Ok(bytes) => {
            state.mark_read(to);
            deliver(chunks, Ok(bytes)).await
        }
        // offsets untouched so the range is retried on the next wake
        Err(err) => deliver(chunks, Err(WatchError::from_io("read", path, &err))).await,
    }
}

/// The descriptor is opened, read, and closed within this call; none is
/// held across channel sends.
async fn read_range(path: &Path, from: u64, to: u64) -> io::Result<Vec<u8>> {
    let mut file = fs::File::open(path).await?;
    if from > 0 {
        file.seek(SeekFrom::Start(from)).await?;
    }
    let mut bytes = Vec::with_capacity((to - from) as usize);
    file.take(to - from).read_to_end(&mut bytes).await?;
    Ok(bytes)
}

/// Forwards a byte stream chunk by chunk until EOF or shutdown. EOF ends
/// the source; closing the chunk channel tells the pipeline to flush.
pub(crate) async fn run_stream(
    mut reader: ByteStream,
    chunks: ChunkSender,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buffer = [0u8; STREAM_CHUNK_BYTES];
    loop {
        tokio::select! {
            read = reader.read(&mut buffer) => match read {
                Ok(0) => return,
                Ok(n) => {
                    if chunks.send(Ok(buffer[..n].to_vec())).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = chunks.send(Err(WatchError::stream_io(&err))).await;
                    return;
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

async fn deliver(chunks: &ChunkSender, chunk: Chunk) -> ControlFlow<()> {
    if chunks.send(chunk).await.is_err() {
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    }
}
