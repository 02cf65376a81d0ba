use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::error::{RecorderError, RecorderResult};
use crate::page::PageSession;
use crate::settings::{FrameSettings, Settings};

/// Outcome of a completed capture run.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSummary {
    pub frame_count: u32,
    pub elapsed: Duration,
}

impl CaptureSummary {
    /// Observed source frame rate: frames captured per elapsed second.
    pub fn actual_framerate(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.frame_count as f64 / seconds
        } else {
            0.0
        }
    }

    /// Template command for turning the frame sequence into a video, using
    /// the observed rate as input rate and the configured output rate.
    pub fn suggested_encode_command(&self, settings: &FrameSettings) -> String {
        format!(
            "ffmpeg -framerate {:.3} -i {}/frame_%04d.png -c:v libx264 -r {} -pix_fmt yuv420p output.mp4",
            self.actual_framerate(),
            settings.output_dir.display(),
            settings.output_fps,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Finished,
    MaxDurationReached,
}

/// Stop once the page reports completion and the minimum run time has
/// elapsed. The maximum duration is a hard cap: reaching it ends the run
/// even if the flag never appeared.
fn stop_reason(
    finished: bool,
    elapsed: Duration,
    min_duration: Duration,
    max_duration: Duration,
) -> Option<StopReason> {
    if finished && elapsed >= min_duration {
        return Some(StopReason::Finished);
    }
    if elapsed >= max_duration {
        return Some(StopReason::MaxDurationReached);
    }
    None
}

fn frame_file_name(index: u32) -> String {
    format!("frame_{index:04}.png")
}

/// Clear and recreate the frame output directory. Prior contents are
/// discarded.
fn prepare_output_dir(dir: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => return Err(error),
    }
    fs::create_dir_all(dir)
}

/// Run the frame-by-frame capture pipeline end to end.
pub async fn run(settings: &Settings) -> RecorderResult<CaptureSummary> {
    prepare_output_dir(&settings.frames.output_dir)?;

    let page = PageSession::open(&settings.page, true).await?;
    sleep(Duration::from_millis(settings.frames.settle_delay_ms)).await;

    let outcome = tokio::select! {
        outcome = capture_loop(&page, &settings.frames) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupt received; abandoning frame capture");
            Err(RecorderError::Interrupted)
        }
    };

    let close_result = page.close().await;
    let summary = outcome?;
    close_result?;

    tracing::info!(
        frame_count = summary.frame_count,
        duration_seconds = format!("{:.2}", summary.elapsed.as_secs_f64()),
        actual_framerate = format!("{:.3}", summary.actual_framerate()),
        "Capture complete"
    );
    tracing::info!(
        "Suggested encode command: {}",
        summary.suggested_encode_command(&settings.frames)
    );

    Ok(summary)
}

async fn capture_loop(
    page: &PageSession,
    settings: &FrameSettings,
) -> RecorderResult<CaptureSummary> {
    let min_duration = Duration::from_millis(settings.min_duration_ms);
    let max_duration = Duration::from_millis(settings.max_duration_ms);
    let poll_interval = Duration::from_millis(settings.poll_interval_ms);

    let started = Instant::now();
    let mut frame_count = 0u32;

    tracing::info!("Capturing frames until the animation reports completion");

    loop {
        let elapsed = started.elapsed();
        let finished = page.is_finished().await?;

        let frame_path = settings.output_dir.join(frame_file_name(frame_count));
        page.capture_still(&frame_path).await?;
        frame_count += 1;

        match stop_reason(finished, elapsed, min_duration, max_duration) {
            Some(StopReason::Finished) => {
                tracing::info!("Animation finished; stopping capture");
                break;
            }
            Some(StopReason::MaxDurationReached) => {
                tracing::warn!(
                    "Maximum capture duration reached before the animation finished; stopping"
                );
                break;
            }
            None => sleep(poll_interval).await,
        }
    }

    Ok(CaptureSummary {
        frame_count,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unique_temp_dir(label: &str) -> PathBuf {
        let unique_suffix = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|duration| duration.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("webrec_{label}_{unique_suffix}"))
    }

    #[test]
    fn frame_names_are_zero_based_and_zero_padded() {
        assert_eq!(frame_file_name(0), "frame_0000.png");
        assert_eq!(frame_file_name(7), "frame_0007.png");
        assert_eq!(frame_file_name(123), "frame_0123.png");
        assert_eq!(frame_file_name(4321), "frame_4321.png");
    }

    #[test]
    fn consecutive_indices_yield_distinct_names() {
        let names: Vec<String> = (0..50).map(frame_file_name).collect();
        let mut deduplicated = names.clone();
        deduplicated.dedup();
        assert_eq!(names, deduplicated);
    }

    #[test]
    fn loop_keeps_running_before_minimum_even_when_finished() {
        let min = Duration::from_millis(5_000);
        let max = Duration::from_millis(60_000);
        assert_eq!(stop_reason(true, Duration::from_millis(3_000), min, max), None);
        assert_eq!(stop_reason(true, Duration::from_millis(4_999), min, max), None);
        assert_eq!(
            stop_reason(true, Duration::from_millis(5_000), min, max),
            Some(StopReason::Finished)
        );
    }

    #[test]
    fn unfinished_animation_stops_at_the_hard_cap() {
        let min = Duration::from_millis(5_000);
        let max = Duration::from_millis(60_000);
        assert_eq!(stop_reason(false, Duration::from_millis(59_999), min, max), None);
        assert_eq!(
            stop_reason(false, Duration::from_millis(60_000), min, max),
            Some(StopReason::MaxDurationReached)
        );
    }

    #[test]
    fn finishing_takes_precedence_over_the_hard_cap() {
        let min = Duration::from_millis(5_000);
        let max = Duration::from_millis(60_000);
        assert_eq!(
            stop_reason(true, Duration::from_millis(60_000), min, max),
            Some(StopReason::Finished)
        );
    }

    #[test]
    fn actual_framerate_matches_count_over_elapsed() {
        let summary = CaptureSummary {
            frame_count: 25,
            elapsed: Duration::from_secs(5),
        };
        assert!((summary.actual_framerate() - 5.0).abs() < 1e-9);

        let single = CaptureSummary {
            frame_count: 1,
            elapsed: Duration::from_millis(200),
        };
        assert!(single.actual_framerate() > 0.0);
    }

    #[test]
    fn zero_elapsed_does_not_divide_by_zero() {
        let summary = CaptureSummary {
            frame_count: 3,
            elapsed: Duration::ZERO,
        };
        assert_eq!(summary.actual_framerate(), 0.0);
    }

    #[test]
    fn suggested_command_uses_observed_input_rate_and_configured_output_rate() {
        let summary = CaptureSummary {
            frame_count: 25,
            elapsed: Duration::from_secs(5),
        };
        let command = summary.suggested_encode_command(&FrameSettings::default());
        assert_eq!(
            command,
            "ffmpeg -framerate 5.000 -i frames/frame_%04d.png -c:v libx264 -r 30 -pix_fmt yuv420p output.mp4"
        );
    }

    #[test]
    fn prepare_output_dir_discards_prior_contents() {
        let dir = unique_temp_dir("frames");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("frame_0000.png"), b"stale").unwrap();

        prepare_output_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        // Idempotent when the directory does not exist yet.
        fs::remove_dir_all(&dir).unwrap();
        prepare_output_dir(&dir).unwrap();
        assert!(dir.is_dir());
        fs::remove_dir_all(&dir).unwrap();
    }
}
