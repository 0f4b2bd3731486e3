// on demand transcoding, one ffmpeg per viewer
//
// the process belongs to the response body: when hyper drops the body (client went away, stream
// ended, read error) the guard stops ffmpeg and reaps it so nothing is left running
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::server::{
    error::{AppResult, Error},
    utils::ffmpeg_utils::TranscodeProfile,
};

// how long ffmpeg gets to exit on its own after closing stdout
const EXIT_GRACE: Duration = Duration::from_secs(5);
// between SIGTERM and SIGKILL, enough for ffmpeg to flush and close the muxer
const TERM_GRACE: Duration = Duration::from_secs(2);
const STDERR_FLUSH: Duration = Duration::from_millis(500);
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub type DynTranscoder = Arc<dyn TranscoderTrait + Send + Sync>;

#[async_trait]
pub trait TranscoderTrait {
    /// spawn the transcoder for a source url, the returned stream owns the process
    fn open_transcode(
        &self,
        source_url: &str,
        profile: &TranscodeProfile,
    ) -> AppResult<TranscodeStream>;

    /// runs `<ffmpeg> -version`, returns how long it took in ms
    async fn health_check(&self) -> AppResult<f64>;
}

pub struct Transcoder {
    program: PathBuf,
    chunk_size: usize,
}

impl Transcoder {
    pub fn new(program: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            program: program.into(),
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait]
impl TranscoderTrait for Transcoder {
    fn open_transcode(
        &self,
        source_url: &str,
        profile: &TranscodeProfile,
    ) -> AppResult<TranscodeStream> {
        let args = profile.build_args(source_url);
        debug!("spawning {} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // backstop only, the guard below is what normally stops it
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::TranscoderSpawn)?;

        let pid = child.id();
        info!("transcoder started (pid {:?}) for {}", pid, source_url);

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::InternalServerErrorWithContext("transcoder stdout was not captured".to_string())
        })?;

        let last_stderr = Arc::new(Mutex::new(None));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, last_stderr.clone(), pid)));

        metrics::counter!("restream_transcode_started_total").increment(1);
        metrics::gauge!("restream_transcode_active").increment(1.0);

        Ok(TranscodeStream {
            reader: ReaderStream::with_capacity(stdout, self.chunk_size),
            process: ProcessGuard {
                child: Some(child),
                pid,
                source: source_url.to_string(),
                last_stderr,
                stderr_task,
            },
            bytes_sent: 0,
            done: false,
        })
    }

    async fn health_check(&self) -> AppResult<f64> {
        let start = Instant::now();

        let status = tokio::time::timeout(
            HEALTH_CHECK_TIMEOUT,
            Command::new(&self.program)
                .arg("-version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status(),
        )
        .await
        .map_err(|_| {
            Error::InternalServerErrorWithContext("transcoder -version timed out".to_string())
        })?
        .map_err(Error::TranscoderSpawn)?;

        if !status.success() {
            return Err(Error::InternalServerErrorWithContext(format!(
                "transcoder -version exited with {}",
                status
            )));
        }

        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}

/// transcoder output, pulled a chunk at a time
///
/// nothing is read from the pipe until the http layer asks for the next chunk, so a slow client
/// ends up blocking ffmpeg on a full pipe instead of buffering in here
pub struct TranscodeStream {
    reader: ReaderStream<ChildStdout>,
    process: ProcessGuard,
    bytes_sent: u64,
    done: bool,
}

impl TranscodeStream {
    pub fn pid(&self) -> Option<u32> {
        self.process.pid
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

impl Stream for TranscodeStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.reader).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            // end the body cleanly, the client just sees a truncated stream
            Poll::Ready(Some(Err(e))) => {
                warn!(
                    "reading transcoder output for {} failed: {}",
                    this.process.source, e
                );
                this.done = true;
                this.process.finish(this.bytes_sent);
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                this.done = true;
                this.process.finish(this.bytes_sent);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

struct ProcessGuard {
    child: Option<Child>,
    pid: Option<u32>,
    source: String,
    last_stderr: Arc<Mutex<Option<String>>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl ProcessGuard {
    /// stdout hit eof, give ffmpeg a moment to exit by itself so the exit status can be logged
    fn finish(&mut self, bytes_sent: u64) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        let source = self.source.clone();
        let last_stderr = self.last_stderr.clone();
        let stderr_task = self.stderr_task.take();

        spawn_on_runtime(async move {
            let exited = tokio::time::timeout(EXIT_GRACE, child.wait()).await;
            match exited {
                Ok(Ok(status)) => {
                    // the last stderr line may still be in the pipe when the exit is noticed
                    if let Some(task) = stderr_task {
                        let _ = tokio::time::timeout(STDERR_FLUSH, task).await;
                    }
                    log_exit(&source, status, bytes_sent, &last_stderr)
                }
                Ok(Err(e)) => warn!("waiting on transcoder for {} failed: {}", source, e),
                Err(_) => {
                    debug!("transcoder for {} closed stdout but kept running", source);
                    stop_process(child, source).await;
                }
            }
        });
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        metrics::gauge!("restream_transcode_active").decrement(1.0);

        let Some(child) = self.child.take() else {
            return;
        };

        // client disconnect, this is the normal way a live stream ends
        debug!(
            "stopping transcoder (pid {:?}) for {}",
            self.pid, self.source
        );

        // with no runtime the future is dropped with the child in it and kill_on_drop takes over
        spawn_on_runtime(stop_process(child, self.source.clone()));
    }
}

/// SIGTERM, then SIGKILL if it is still around after TERM_GRACE, then reap
async fn stop_process(mut child: Child, source: String) {
    if let Err(e) = terminate(&mut child) {
        // already exited, still needs reaping
        debug!("transcoder for {} already gone: {}", source, e);
    }

    let exited = tokio::time::timeout(TERM_GRACE, child.wait()).await;
    let status = match exited {
        Ok(status) => status,
        Err(_) => {
            debug!("transcoder for {} ignored SIGTERM, killing it", source);
            if let Err(e) = child.start_kill() {
                warn!("killing transcoder for {} failed: {}", source, e);
            }
            child.wait().await
        }
    };

    match status {
        Ok(status) => debug!("transcoder for {} reaped: {}", source, status),
        Err(e) => warn!("reaping transcoder for {} failed: {}", source, e),
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    // id() is None once the child has been reaped, until then the pid can't be reused
    let pid = child
        .id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process already reaped"))?;

    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: plain kill(2) on our own unreaped child
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

// drops can happen off the runtime (shutdown), kill_on_drop and tokio's orphan reaper cover those
fn spawn_on_runtime<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(fut);
    }
}

fn log_exit(source: &str, status: ExitStatus, bytes_sent: u64, last_stderr: &Mutex<Option<String>>) {
    let last_line = last_stderr
        .lock()
        .ok()
        .and_then(|l| l.clone())
        .unwrap_or_default();

    match (bytes_sent, status.success()) {
        (0, true) => warn!("transcoder for {} exited without producing output", source),
        (0, false) => warn!(
            "transcoder for {} failed before producing output ({}): {}",
            source, status, last_line
        ),
        (n, true) => info!("transcoder for {} finished after {} bytes", source, n),
        (n, false) => warn!(
            "transcoder for {} exited with {} after {} bytes: {}",
            source, status, n, last_line
        ),
    }
}

// keeps reading until eof whatever ffmpeg writes, closing the pipe early would hand it EPIPE on
// its next log line
async fn drain_stderr(stderr: ChildStderr, last_line: Arc<Mutex<Option<String>>>, pid: Option<u32>) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }

                debug!("ffmpeg[{:?}]: {}", pid, line);
                if let Ok(mut last) = last_line.lock() {
                    *last = Some(line.to_string());
                }
            }
            Err(e) => {
                debug!("reading ffmpeg[{:?}] stderr failed: {}", pid, e);
                // stop parsing but keep the pipe open and empty
                if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                    debug!("discarding ffmpeg[{:?}] stderr failed: {}", pid, e);
                }
                break;
            }
        }
    }
}
