use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::error::{RecorderError, RecorderResult};
use crate::settings::EncoderSettings;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One spawned FFmpeg screen/audio capture process.
///
/// The handle is owned by whoever started it; there is no process-wide
/// registry. `stop` sends the conventional `q` keystroke and returns
/// immediately; `wait` awaits process exit with an upper bound and kills
/// the child once the bound is exceeded.
pub struct EncoderProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_thread: Option<thread::JoinHandle<()>>,
}

/// Build the capture invocation. The argument list reproduces the reference
/// command and must stay compatible with it: GDI screen grab of a fixed
/// region, DirectShow audio input, H.264 + AAC into an MP4 container.
fn build_command(settings: &EncoderSettings, output_path: &Path) -> Command {
    let mut command = Command::new(&settings.ffmpeg_path);
    command
        .arg("-y")
        .arg("-f")
        .arg("gdigrab")
        .arg("-framerate")
        .arg(settings.frame_rate.to_string())
        .arg("-offset_x")
        .arg(settings.offset_x.to_string())
        .arg("-offset_y")
        .arg(settings.offset_y.to_string())
        .arg("-video_size")
        .arg(format!(
            "{}x{}",
            settings.capture_width, settings.capture_height
        ))
        .arg("-i")
        .arg("desktop")
        .arg("-f")
        .arg("dshow")
        .arg("-i")
        .arg(format!("audio={}", settings.audio_device))
        .arg("-c:v")
        .arg(&settings.video_codec)
        .arg("-c:a")
        .arg(&settings.audio_codec)
        .arg("-pix_fmt")
        .arg(&settings.pixel_format)
        .arg("-r")
        .arg(settings.frame_rate.to_string())
        .arg(output_path);
    command
}

impl EncoderProcess {
    /// Spawn the encoder against `output_path`, overwriting it if present.
    pub fn start(settings: &EncoderSettings, output_path: &Path) -> RecorderResult<Self> {
        tracing::info!(
            ffmpeg_path = %settings.ffmpeg_path.display(),
            output_path = %output_path.display(),
            frame_rate = settings.frame_rate,
            "Starting FFmpeg capture process"
        );
        Self::start_with_command(build_command(settings, output_path))
    }

    pub(crate) fn start_with_command(mut command: Command) -> RecorderResult<Self> {
        let program = command.get_program().to_string_lossy().to_string();
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RecorderError::EncoderSpawn { program, source })?;

        let stdin = child.stdin.take();
        let stderr_thread = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(content) if !content.trim().is_empty() => {
                            tracing::info!("ffmpeg: {}", content.trim());
                        }
                        Ok(_) => {}
                        Err(error) => {
                            tracing::warn!("Failed to read FFmpeg stderr: {error}");
                            break;
                        }
                    }
                }
            })
        });

        Ok(Self {
            child,
            stdin,
            stderr_thread,
        })
    }

    /// Request a graceful shutdown by writing the `q` keystroke to the
    /// control channel, then close the pipe. Returns immediately without
    /// waiting for exit. Calling this again, or on a process whose control
    /// channel is already gone, is a no-op.
    pub fn stop(&mut self) {
        match self.stdin.take() {
            Some(mut stdin) => {
                let _ = stdin.write_all(b"q\n");
                let _ = stdin.flush();
            }
            None => {
                tracing::debug!("Encoder stop requested but no control channel is held");
            }
        }
    }

    /// Await process exit, killing the child once `timeout` elapses. Joins
    /// the stderr forwarder before returning the exit status.
    pub async fn wait(&mut self, timeout: Duration) -> RecorderResult<ExitStatus> {
        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = self.child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                tracing::warn!("Encoder did not exit within {timeout:?}; killing the process");
                self.child.kill()?;
                break self.child.wait()?;
            }
            sleep(EXIT_POLL_INTERVAL).await;
        };

        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }

        if status.success() {
            tracing::info!("FFmpeg capture process finished");
        } else {
            tracing::warn!(%status, "FFmpeg capture process exited with failure");
        }
        Ok(status)
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        // A handle dropped without `wait` must not leak the child.
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
