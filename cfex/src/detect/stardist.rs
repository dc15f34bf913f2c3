//! StarDist segmentation through a long-lived Python worker
//!
//! The worker loads the pretrained model once and then answers one request
//! per line on stdin: `<crop.png>\t<labels.tif>`. It replies `ok` after
//! writing the 16-bit label image, or `error <message>`.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use image::{Luma, RgbImage};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::service::Segmenter;
use super::types::DetectError;
use crate::config::StarDistConfig;
use crate::mask::LabelImage;

/// Running worker process
struct Worker {
    // Held so the process is killed when the worker is dropped
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    /// A request was sent but its reply never read
    pending: bool,
}

impl Worker {
    async fn request(&mut self, input: &Path, output: &Path) -> Result<(), DetectError> {
        self.pending = true;
        let line = format!("{}\t{}\n", input.display(), output.display());
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let reply = self
            .stdout
            .next_line()
            .await?
            .ok_or_else(|| DetectError::Backend("StarDist worker exited".to_string()))?;
        self.pending = false;
        parse_reply(&reply)
    }
}

fn parse_reply(reply: &str) -> Result<(), DetectError> {
    let reply = reply.trim();
    if reply == "ok" {
        return Ok(());
    }
    match reply.strip_prefix("error") {
        Some(message) => Err(DetectError::Backend(message.trim().to_string())),
        None => Err(DetectError::Backend(format!(
            "unexpected worker reply: {reply}"
        ))),
    }
}

/// Read a label image written by the worker
fn read_labels(path: &Path) -> Result<LabelImage, DetectError> {
    let gray = image::open(path)?.into_luma16();
    Ok(LabelImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([u32::from(gray.get_pixel(x, y).0[0])])
    }))
}

/// Nucleus segmentation backed by a pretrained StarDist model
pub struct StarDistSegmenter {
    config: StarDistConfig,
    scratch: TempDir,
    counter: AtomicU64,
    worker: Mutex<Option<Worker>>,
}

impl StarDistSegmenter {
    /// Create the segmenter. The worker is started by [`Segmenter::start`]
    /// or, failing that, on the first request.
    pub fn new(config: StarDistConfig) -> Result<Self, DetectError> {
        let scratch = tempfile::Builder::new().prefix("cfex-stardist").tempdir()?;
        debug!("StarDist scratch directory: {:?}", scratch.path());
        Ok(Self {
            config,
            scratch,
            counter: AtomicU64::new(0),
            worker: Mutex::new(None),
        })
    }

    async fn spawn(&self) -> Result<Worker, DetectError> {
        info!(
            "Starting StarDist worker: {} {:?} (model {})",
            self.config.program, self.config.script, self.config.model
        );
        let mut child = Command::new(&self.config.program)
            .arg(&self.config.script)
            .arg("--model")
            .arg(&self.config.model)
            .arg("--percentiles")
            .arg(self.config.percentile_low.to_string())
            .arg(self.config.percentile_high.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DetectError::Backend("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DetectError::Backend("worker stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("stardist: {}", line);
                }
            });
        }

        let mut stdout = BufReader::new(stdout).lines();
        let greeting = tokio::time::timeout(self.config.startup_timeout, stdout.next_line())
            .await
            .map_err(|_| DetectError::Timeout(self.config.startup_timeout))??;
        match greeting.as_deref().map(str::trim) {
            Some("ready") => {
                info!("StarDist worker ready");
                Ok(Worker {
                    _child: child,
                    stdin,
                    stdout,
                    pending: false,
                })
            }
            other => Err(DetectError::Backend(format!(
                "StarDist worker failed to start: {other:?}"
            ))),
        }
    }
}

#[async_trait]
impl Segmenter for StarDistSegmenter {
    fn name(&self) -> &'static str {
        "stardist"
    }

    /// Spawn the worker unless one is running; waits up to the startup
    /// timeout for the model to load
    async fn start(&self) -> Result<(), DetectError> {
        let mut guard = self.worker.lock().await;
        if guard.as_ref().is_some_and(|worker| worker.pending) {
            warn!("StarDist worker did not answer a previous request, restarting");
            *guard = None;
        }
        if guard.is_none() {
            *guard = Some(self.spawn().await?);
        }
        Ok(())
    }

    async fn segment(&self, image: &RgbImage) -> Result<LabelImage, DetectError> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let input = self.scratch.path().join(format!("crop{id}.png"));
        let output = self.scratch.path().join(format!("labels{id}.tif"));
        image.save(&input)?;

        let mut guard = self.worker.lock().await;
        if guard.as_ref().is_some_and(|worker| worker.pending) {
            warn!("StarDist worker did not answer a previous request, restarting");
            *guard = None;
        }
        if guard.is_none() {
            *guard = Some(self.spawn().await?);
        }
        let Some(worker) = guard.as_mut() else {
            return Err(DetectError::Backend("StarDist worker unavailable".to_string()));
        };
        let reply = worker.request(&input, &output).await;
        if worker.pending {
            *guard = None;
        }
        drop(guard);

        let labels = reply.and_then(|()| read_labels(&output));
        let _ = std::fs::remove_file(&input);
        let _ = std::fs::remove_file(&output);
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    #[test]
    fn test_parse_reply() {
        assert!(parse_reply("ok").is_ok());
        assert!(parse_reply("ok\r").is_ok());
        match parse_reply("error model exploded") {
            Err(DetectError::Backend(message)) => assert_eq!(message, "model exploded"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(parse_reply("hello"), Err(DetectError::Backend(_))));
    }

    #[test]
    fn test_read_labels_from_16bit_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.tif");
        let mut labels: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::new(4, 3);
        labels.put_pixel(1, 1, Luma([300]));
        labels.put_pixel(3, 2, Luma([7]));
        labels.save(&path).unwrap();

        let read = read_labels(&path).unwrap();
        assert_eq!(read.dimensions(), (4, 3));
        assert_eq!(read.get_pixel(1, 1).0[0], 300);
        assert_eq!(read.get_pixel(3, 2).0[0], 7);
        assert_eq!(read.get_pixel(0, 0).0[0], 0);
    }

    #[cfg(unix)]
    fn shell_worker(dir: &TempDir, body: &str) -> StarDistConfig {
        let script = dir.path().join("worker.sh");
        std::fs::write(&script, body).unwrap();
        StarDistConfig {
            program: "sh".to_string(),
            script,
            startup_timeout: std::time::Duration::from_secs(5),
            ..StarDistConfig::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_error_reply() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_worker(
            &dir,
            "echo ready\nwhile read line; do echo \"error no model\"; done\n",
        );
        let segmenter = StarDistSegmenter::new(config).unwrap();
        let image = RgbImage::new(8, 8);
        for _ in 0..2 {
            match segmenter.segment(&image).await {
                Err(DetectError::Backend(message)) => assert_eq!(message, "no model"),
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_without_greeting() {
        let dir = tempfile::tempdir().unwrap();
        let config = shell_worker(&dir, "echo loading failed\n");
        let segmenter = StarDistSegmenter::new(config).unwrap();
        let err = segmenter.segment(&RgbImage::new(8, 8)).await.unwrap_err();
        assert!(matches!(err, DetectError::Backend(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_startup_is_outside_crop_deadline() {
        use super::super::{BatchMode, CellDetector, DetectionStatus};
        use indicatif::ProgressBar;
        use std::sync::Arc;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let config = shell_worker(
            &dir,
            "sleep 1\necho ready\nwhile read line; do echo \"error no model\"; done\n",
        );
        let segmenter = Arc::new(StarDistSegmenter::new(config).unwrap());
        let detector = CellDetector::new(segmenter, Duration::from_millis(300), BatchMode::Continue);

        let images = vec![RgbImage::new(8, 8), RgbImage::new(8, 8)];
        let detections = detector
            .detect(&images, false, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(detections.status, vec![DetectionStatus::Failed; 2]);
        for (_, error) in &detections.failures {
            match error {
                DetectError::Cell { source, .. } => {
                    assert!(matches!(source.as_ref(), DetectError::Backend(m) if m == "no model"));
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_reuses_running_worker() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("starts");
        let body = format!(
            "echo x >> {}\necho ready\nwhile read line; do echo \"error no model\"; done\n",
            marker.display()
        );
        let segmenter = StarDistSegmenter::new(shell_worker(&dir, &body)).unwrap();
        segmenter.start().await.unwrap();
        segmenter.start().await.unwrap();
        assert!(segmenter.segment(&RgbImage::new(8, 8)).await.is_err());
        segmenter.start().await.unwrap();
        let starts = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(starts.lines().count(), 1);
    }
}
