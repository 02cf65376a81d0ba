use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RecorderResult;

/// Top-level configuration for both capture modes.
///
/// Every field has a default matching the reference setup, so an absent or
/// partial settings file still yields a runnable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub page: PageSettings,
    pub frames: FrameSettings,
    pub recording: RecordingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageSettings {
    /// Target web application serving the animation.
    pub url: String,
    /// CSS selector whose presence marks the page as laid out.
    pub ready_selector: String,
    /// Maximum time to wait for the readiness selector, in milliseconds.
    pub ready_timeout_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            ready_selector: "#chat-container".to_string(),
            ready_timeout_ms: 30_000,
            viewport_width: 500,
            viewport_height: 1100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameSettings {
    /// Directory receiving the PNG sequence. Cleared on every run.
    pub output_dir: PathBuf,
    /// Delay after the readiness selector appears, letting layout settle.
    pub settle_delay_ms: u64,
    /// The loop never stops before this much time has elapsed, even if the
    /// finished flag is already set.
    pub min_duration_ms: u64,
    /// Hard cap on the capture loop; reaching it stops the run with a
    /// warning even if the finished flag never appeared.
    pub max_duration_ms: u64,
    /// Sleep between iterations. Deliberately much shorter than the nominal
    /// cadence, so the effective frame rate is whatever capture throughput
    /// allows.
    pub poll_interval_ms: u64,
    /// Output frame rate used in the suggested encode command.
    pub output_fps: u32,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("frames"),
            settle_delay_ms: 1_000,
            min_duration_ms: 5_000,
            max_duration_ms: 60_000,
            poll_interval_ms: 10,
            output_fps: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecordingSettings {
    /// Delay between page readiness and encoder start.
    pub pre_roll_ms: u64,
    /// Maximum time to wait for the finished flag once recording.
    pub finish_timeout_ms: u64,
    /// Grace period for the encoder to flush and exit after the stop
    /// keystroke; the process is killed once this elapses.
    pub stop_timeout_ms: u64,
    /// Directory receiving the timestamped output file.
    pub output_dir: PathBuf,
    pub encoder: EncoderSettings,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            pre_roll_ms: 2_000,
            finish_timeout_ms: 60_000,
            stop_timeout_ms: 5_000,
            output_dir: PathBuf::from("."),
            encoder: EncoderSettings::default(),
        }
    }
}

/// FFmpeg invocation parameters. The defaults reproduce the reference
/// capture command exactly and must stay compatible with it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderSettings {
    pub ffmpeg_path: PathBuf,
    pub offset_x: u32,
    pub offset_y: u32,
    pub capture_width: u32,
    pub capture_height: u32,
    pub frame_rate: u32,
    pub audio_device: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub pixel_format: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            offset_x: 20,
            offset_y: 90,
            capture_width: 480,
            capture_height: 916,
            frame_rate: 30,
            audio_device: "CABLE Output (VB-Audio Virtual Cable)".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            pixel_format: "yuv420p".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, or fall back to the defaults when no
    /// path is given.
    pub fn load(path: Option<&Path>) -> RecorderResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_setup() {
        let settings = Settings::default();
        assert_eq!(settings.page.url, "http://127.0.0.1:3000");
        assert_eq!(settings.page.ready_selector, "#chat-container");
        assert_eq!(settings.page.viewport_width, 500);
        assert_eq!(settings.page.viewport_height, 1100);
        assert_eq!(settings.frames.min_duration_ms, 5_000);
        assert_eq!(settings.frames.max_duration_ms, 60_000);
        assert_eq!(settings.frames.poll_interval_ms, 10);
        assert_eq!(settings.recording.pre_roll_ms, 2_000);
        assert_eq!(settings.recording.finish_timeout_ms, 60_000);
        assert_eq!(settings.recording.encoder.capture_width, 480);
        assert_eq!(settings.recording.encoder.capture_height, 916);
        assert_eq!(settings.recording.encoder.offset_x, 20);
        assert_eq!(settings.recording.encoder.offset_y, 90);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let parsed: Settings = serde_json::from_str(
            r#"{ "frames": { "output_dir": "shots", "min_duration_ms": 2000 } }"#,
        )
        .unwrap();
        assert_eq!(parsed.frames.output_dir, PathBuf::from("shots"));
        assert_eq!(parsed.frames.min_duration_ms, 2_000);
        assert_eq!(parsed.frames.max_duration_ms, 60_000);
        assert_eq!(parsed.page.url, "http://127.0.0.1:3000");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<Settings>(r#"{ "framez": {} }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_file_propagates_io_error() {
        let result = Settings::load(Some(Path::new("/nonexistent/webrec.json")));
        assert!(result.is_err());
    }
}
