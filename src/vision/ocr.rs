//! OCR engine invocation
//!
//! Text recognition itself is done by an external engine (EasyOCR by
//! default) run as a child process over an image file. The engine's standard
//! output is returned untouched; interpreting it is the job of
//! [`super::parse`].
//!
//! The engine is expected to be installed already. Provisioning it is a
//! deployment concern.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::error::EngineError;
use crate::config::EngineSettings;

/// How often a running engine is checked for completion, timeout or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Source of raw OCR output for an image
pub trait OcrEngine: Send + Sync {
    /// Run recognition on the image at `image` and return the engine's text output
    fn recognize(&self, image: &Path, cancel: &CancelToken) -> Result<String, EngineError>;
}

/// Shared flag used to abandon in-flight scans
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Engine run as an external command; the image path is passed as the last argument
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: EngineSettings::default().timeout(),
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.clone()).with_timeout(settings.timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn spawn(&self, image: &Path) -> Result<Child, EngineError> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Missing {
                program: self.program.clone(),
                source,
            })
    }
}

impl OcrEngine for CommandEngine {
    fn recognize(&self, image: &Path, cancel: &CancelToken) -> Result<String, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        debug!("Running OCR engine {} on {:?}", self.program, image);
        let start = Instant::now();
        let mut child = self.spawn(image)?;

        // Drain both pipes on their own threads so a chatty engine cannot
        // block on a full pipe while we wait for it
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.is_cancelled() {
                kill(&mut child);
                return Err(EngineError::Cancelled);
            }
            if start.elapsed() > self.timeout {
                warn!("OCR engine timed out after {:?}, killing it", self.timeout);
                kill(&mut child);
                return Err(EngineError::Timeout(self.timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stdout = join_output(stdout)?;
        let stderr = join_output(stderr)?;
        debug!("OCR engine finished in {:?} with {}", start.elapsed(), status);

        if !status.success() {
            return Err(EngineError::Failed {
                status,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_output(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<String, EngineError> {
    let bytes = handle
        .join()
        .map_err(|_| std::io::Error::other("OCR output reader panicked"))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Kill and reap. Reader threads are left to finish on their own once the
/// pipes close.
fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill OCR engine: {}", e);
    }
    let _ = child.wait();
}
