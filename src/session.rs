use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::time::sleep;

use crate::encoder::EncoderProcess;
use crate::error::{RecorderError, RecorderResult};
use crate::page::PageSession;
use crate::settings::{EncoderSettings, RecordingSettings, Settings};

/// Output file name derived from the capture timestamp, with `:` and `.`
/// replaced so the name is filesystem-safe.
fn recording_file_name(timestamp: DateTime<Utc>) -> String {
    let iso = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
    format!("recording-{}.mp4", iso.replace([':', '.'], "-"))
}

/// One armed recording. The session owns its encoder handle exclusively;
/// there is no process-wide encoder slot.
pub struct RecordingSession {
    output_path: PathBuf,
    encoder: Option<EncoderProcess>,
    stop_requested: bool,
}

impl RecordingSession {
    pub fn new(output_dir: &Path, timestamp: DateTime<Utc>) -> Self {
        Self {
            output_path: output_dir.join(recording_file_name(timestamp)),
            encoder: None,
            stop_requested: false,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Start the encoder against this session's output file. Fails fast
    /// with `EncoderBusy` if an encoder is already running; a session never
    /// silently replaces or abandons a live process.
    pub fn start_encoder(&mut self, settings: &EncoderSettings) -> RecorderResult<()> {
        if self.encoder.is_some() {
            return Err(RecorderError::EncoderBusy);
        }
        self.encoder = Some(EncoderProcess::start(settings, &self.output_path)?);
        Ok(())
    }

    /// Signal the encoder to stop gracefully. Safe to call when no encoder
    /// was ever started, and safe to call more than once.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.stop();
        }
    }

    /// Await encoder exit (killing it once `stop_timeout` elapses) and
    /// yield the output path. Consumes the session.
    pub async fn finish(mut self, stop_timeout: Duration) -> RecorderResult<PathBuf> {
        if !self.stop_requested {
            self.request_stop();
        }
        if let Some(mut encoder) = self.encoder.take() {
            encoder.wait(stop_timeout).await?;
        }
        Ok(self.output_path)
    }
}

/// Run the direct-to-video recording pipeline end to end.
pub async fn run(settings: &Settings) -> RecorderResult<PathBuf> {
    tracing::info!(url = %settings.page.url, "Opening target page");
    let page = PageSession::open(&settings.page, false).await?;

    let outcome = record(&page, &settings.recording).await;

    let close_result = page.close().await;
    let output_path = outcome?;
    close_result?;
    tracing::info!(output_path = %output_path.display(), "Recording finalized; browser closed");
    Ok(output_path)
}

async fn record(page: &PageSession, settings: &RecordingSettings) -> RecorderResult<PathBuf> {
    // Pre-roll between readiness and encoder start, letting the page paint.
    sleep(Duration::from_millis(settings.pre_roll_ms)).await;

    let mut session = RecordingSession::new(&settings.output_dir, Utc::now());
    tracing::info!(
        output_path = %session.output_path().display(),
        "Starting FFmpeg recording"
    );
    session.start_encoder(&settings.encoder)?;

    tracing::info!("Recording; waiting for the animation to complete");
    let finish_timeout = Duration::from_millis(settings.finish_timeout_ms);
    let stop_timeout = Duration::from_millis(settings.stop_timeout_ms);

    let waited = tokio::select! {
        waited = page.wait_until_finished(finish_timeout) => waited,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupt received during recording");
            Err(RecorderError::Interrupted)
        }
    };

    // The encoder is signalled on every path; a wait failure must not
    // orphan the external process.
    session.request_stop();

    match waited {
        Ok(()) => {
            tracing::info!("Animation finished; stopping FFmpeg");
            session.finish(stop_timeout).await
        }
        Err(error) => {
            let _ = session.finish(stop_timeout).await;
            Err(match error {
                RecorderError::Timeout { waited } => RecorderError::RecordingTimeout { waited },
                other => other,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::milliseconds(678)
    }

    #[test]
    fn file_name_replaces_colons_and_periods() {
        let name = recording_file_name(fixed_timestamp());
        assert_eq!(name, "recording-2025-01-02T03-04-05-678Z.mp4");
    }

    #[test]
    fn file_name_is_filesystem_safe() {
        let name = recording_file_name(Utc::now());
        let stem = name.strip_suffix(".mp4").unwrap();
        assert!(!stem.contains(':'));
        assert!(!stem.contains('.'));
    }

    #[test]
    fn session_places_output_in_the_configured_directory() {
        let session = RecordingSession::new(Path::new("recordings"), fixed_timestamp());
        assert_eq!(
            session.output_path(),
            Path::new("recordings/recording-2025-01-02T03-04-05-678Z.mp4")
        );
    }

    #[tokio::test]
    async fn stop_without_an_encoder_is_a_no_op() {
        let mut session = RecordingSession::new(Path::new("."), fixed_timestamp());
        session.request_stop();
        session.request_stop();
        let output = session.finish(Duration::from_millis(100)).await.unwrap();
        assert!(output.ends_with("recording-2025-01-02T03-04-05-678Z.mp4"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn second_start_fails_fast_while_an_encoder_is_live() {
        let mut session = RecordingSession::new(Path::new("."), fixed_timestamp());
        session.encoder = Some(
            crate::encoder::EncoderProcess::start_with_command(std::process::Command::new("cat"))
                .unwrap(),
        );

        let result = session.start_encoder(&EncoderSettings::default());
        assert!(matches!(result, Err(RecorderError::EncoderBusy)));

        session.request_stop();
        session.finish(Duration::from_secs(5)).await.unwrap();
    }
}
