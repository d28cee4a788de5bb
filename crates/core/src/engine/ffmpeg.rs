//! FFmpeg-based codec engine.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::error::EngineError;
use super::traits::CodecEngine;
use super::types::{cancelled, CancelSignal, SourceInfo, TagMap, TranscodeJob, TranscodeOutput};
use crate::format::TargetFormat;
use crate::progress::ProgressMonitor;

/// FFmpeg-based engine implementation.
pub struct FfmpegEngine {
    config: EngineConfig,
}

impl FfmpegEngine {
    /// Creates a new FFmpeg engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bitrate to request for a lossy target, if any.
    fn lossy_bitrate(&self, format: TargetFormat, source: &SourceInfo) -> Option<u32> {
        if format.is_lossless() {
            return None;
        }
        let requested = self.config.lossy_bitrate_kbps.or(source.bitrate_kbps)?;
        // Opus and Vorbis encoders cap the rate per channel.
        let channels = u32::from(source.channels.unwrap_or(2).max(1));
        let (min, max) = match format {
            TargetFormat::Mp3 => (32, 320),
            TargetFormat::Opus => (6, (256 * channels).min(510)),
            TargetFormat::Vorbis => (45, (240 * channels).min(500)),
            TargetFormat::Flac => return None,
        };
        Some(requested.clamp(min, max))
    }

    /// Builds ffmpeg arguments for a transcode job.
    fn build_args(&self, job: &TranscodeJob) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(), // Overwrite output
            "-nostdin".to_string(),
            "-i".to_string(),
            job.source.path.to_string_lossy().to_string(),
            "-map".to_string(),
            format!("0:{}", job.source.stream_index),
            // Source container tags first, caller tags override below
            "-map_metadata".to_string(),
            "0".to_string(),
        ];

        args.extend(["-c:a".to_string(), job.format.encoder().to_string()]);

        if let Some(bitrate) = self.lossy_bitrate(job.format, &job.source) {
            args.extend(["-b:a".to_string(), format!("{}k", bitrate)]);
        }

        if job.format.is_lossless() {
            if let Some(level) = self.config.flac_compression_level {
                args.extend(["-compression_level".to_string(), level.to_string()]);
            }
        }

        args.extend(metadata_args(&job.metadata));

        args.extend([
            "-f".to_string(),
            job.format.container().ffmpeg_muxer().to_string(),
        ]);

        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());

        args.push(job.output_path.to_string_lossy().to_string());

        args
    }

    /// Parses ffprobe JSON output into SourceInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<SourceInfo, EngineError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
            size: Option<String>,
            bit_rate: Option<String>,
            #[serde(default)]
            tags: BTreeMap<String, String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            index: u32,
            codec_type: String,
            codec_name: Option<String>,
            bit_rate: Option<String>,
            sample_rate: Option<String>,
            channels: Option<u8>,
            duration: Option<String>,
            #[serde(default)]
            disposition: BTreeMap<String, u8>,
            #[serde(default)]
            tags: BTreeMap<String, String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| EngineError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        // Prefer the stream flagged as default, else the first audio stream
        let audio_streams: Vec<&ProbeStream> = probe
            .streams
            .iter()
            .filter(|s| s.codec_type == "audio")
            .collect();
        let stream = audio_streams
            .iter()
            .find(|s| s.disposition.get("default").copied() == Some(1))
            .or_else(|| audio_streams.first())
            .copied()
            .ok_or_else(|| EngineError::NoAudioStream {
                path: path.to_path_buf(),
            })?;

        let parse_f64 = |v: &Option<String>| v.as_ref().and_then(|d| d.parse::<f64>().ok());
        let parse_kbps = |v: &Option<String>| {
            v.as_ref()
                .and_then(|b| b.parse::<u32>().ok())
                .map(|b| b / 1000)
        };

        let duration_secs = parse_f64(&probe.format.duration)
            .or_else(|| parse_f64(&stream.duration))
            .unwrap_or(0.0);

        let size_bytes = probe
            .format
            .size
            .as_ref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let container = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown")
            .to_string();

        Ok(SourceInfo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs,
            container,
            stream_index: stream.index,
            codec: stream
                .codec_name
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            bitrate_kbps: parse_kbps(&stream.bit_rate).or_else(|| parse_kbps(&probe.format.bit_rate)),
            sample_rate: stream
                .sample_rate
                .as_ref()
                .and_then(|r| r.parse::<u32>().ok()),
            channels: stream.channels,
            // Ogg keeps its comments on the stream; container tags win on clashes.
            tags: stream
                .tags
                .iter()
                .chain(probe.format.tags.iter())
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
        })
    }

    /// Runs ffmpeg for one job, publishing progress as it goes.
    async fn run_transcode(
        &self,
        job: &TranscodeJob,
        progress: &ProgressMonitor,
        mut cancel: CancelSignal,
    ) -> Result<TranscodeOutput, EngineError> {
        let start = Instant::now();

        // Ensure output directory exists
        if let Some(parent) = job.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|_| {
                EngineError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                }
            })?;
        }

        let args = self.build_args(job);
        debug!("Session {} running ffmpeg {:?}", job.session_id, args);

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::conversion_failed("ffmpeg stderr not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let time_regex = Regex::new(r"out_time_(?:ms|us)=(\d+)").ok();
        let duration_secs = job.source.duration_secs;

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let run = async {
            let mut error_output = String::new();

            while let Some(line) = reader.next_line().await? {
                // Capture error output
                if line.contains("Error") || line.contains("error") {
                    error_output.push_str(&line);
                    error_output.push('\n');
                }

                // Both keys carry microseconds
                let micros = time_regex
                    .as_ref()
                    .and_then(|re| re.captures(&line))
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<f64>().ok());
                if let Some(micros) = micros {
                    if duration_secs > 0.0 {
                        progress.advance_fraction(micros / 1_000_000.0 / duration_secs);
                    }
                }
            }

            let status = child.wait().await?;
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, error_output))
        };

        let outcome = tokio::select! {
            result = timeout(timeout_duration, run) => Some(result),
            _ = cancelled(&mut cancel) => None,
        };

        match outcome {
            Some(Ok(Ok((status, error_output)))) => {
                if !status.success() {
                    return Err(EngineError::conversion_failed(
                        format!("FFmpeg exited with code: {:?}", status.code()),
                        if error_output.is_empty() {
                            None
                        } else {
                            Some(error_output)
                        },
                    ));
                }
            }
            Some(Ok(Err(e))) => return Err(EngineError::Io(e)),
            Some(Err(_)) => {
                // Kill the process on timeout
                let _ = child.kill().await;
                return Err(EngineError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
            None => {
                info!("Session {} conversion cancelled, stopping ffmpeg", job.session_id);
                let _ = child.kill().await;
                return Err(EngineError::Cancelled);
            }
        }

        // Verify output exists and get size
        let output_meta = tokio::fs::metadata(&job.output_path)
            .await
            .map_err(|_| EngineError::conversion_failed("Output file not created", None))?;

        Ok(TranscodeOutput {
            output_path: job.output_path.clone(),
            output_size_bytes: output_meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Converts caller tags into ffmpeg `-metadata key=value` pairs.
fn metadata_args(tags: &TagMap) -> Vec<String> {
    tags.iter()
        .flat_map(|(key, value)| ["-metadata".to_string(), format!("{}={}", key, value)])
        .collect()
}

#[async_trait]
impl CodecEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<SourceInfo, EngineError> {
        if !path.is_file() {
            return Err(EngineError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn transcode(
        &self,
        job: &TranscodeJob,
        progress: &ProgressMonitor,
        cancel: CancelSignal,
    ) -> Result<TranscodeOutput, EngineError> {
        let result = self.run_transcode(job, progress, cancel).await;
        if let Err(ref e) = result {
            warn!("Session {} ffmpeg transcode failed: {}", job.session_id, e);
        }
        result
    }

    async fn validate(&self) -> Result<(), EngineError> {
        // Check ffmpeg exists
        let ffmpeg_result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffmpeg_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(EngineError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(EngineError::Io(e));
        }

        // Check ffprobe exists
        let ffprobe_result = Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffprobe_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(EngineError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                });
            }
            return Err(EngineError::Io(e));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use std::path::PathBuf;

    fn wav_source() -> SourceInfo {
        SourceInfo {
            path: PathBuf::from("/input.wav"),
            size_bytes: 31_752_044,
            duration_secs: 180.0,
            container: "wav".to_string(),
            stream_index: 0,
            codec: "pcm_s16le".to_string(),
            bitrate_kbps: Some(1411),
            sample_rate: Some(44100),
            channels: Some(2),
            tags: TagMap::new(),
        }
    }

    fn job(format: TargetFormat, output: &str) -> TranscodeJob {
        TranscodeJob {
            session_id: SessionId::from_raw(1),
            source: wav_source(),
            format,
            output_path: PathBuf::from(output),
            metadata: [("title".to_string(), "Song".to_string())].into(),
        }
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_build_args_opus() {
        let engine = FfmpegEngine::with_defaults();
        let args = engine.build_args(&job(TargetFormat::Opus, "/out/song.ogg"));

        assert!(has_pair(&args, "-c:a", "libopus"));
        assert!(has_pair(&args, "-f", "ogg"));
        assert!(has_pair(&args, "-map", "0:0"));
        assert!(has_pair(&args, "-metadata", "title=Song"));
        assert!(has_pair(&args, "-map_metadata", "0"));
        // Source bitrate is clamped to the encoder maximum
        assert!(has_pair(&args, "-b:a", "510k"));
        assert_eq!(args.last().map(String::as_str), Some("/out/song.ogg"));
    }

    #[test]
    fn test_build_args_mono_caps_per_channel() {
        let engine = FfmpegEngine::with_defaults();

        let mut opus = job(TargetFormat::Opus, "/out/song.ogg");
        opus.source.channels = Some(1);
        opus.source.bitrate_kbps = Some(705);
        assert!(has_pair(&engine.build_args(&opus), "-b:a", "256k"));

        let mut vorbis = job(TargetFormat::Vorbis, "/out/song.ogg");
        vorbis.source.channels = Some(1);
        vorbis.source.bitrate_kbps = Some(705);
        assert!(has_pair(&engine.build_args(&vorbis), "-b:a", "240k"));

        // Stereo keeps the encoder-wide ceiling.
        let stereo = job(TargetFormat::Opus, "/out/song.ogg");
        assert!(has_pair(&engine.build_args(&stereo), "-b:a", "510k"));
    }

    #[test]
    fn test_build_args_mp3_with_configured_bitrate() {
        let engine = FfmpegEngine::new(EngineConfig::default().with_lossy_bitrate(192));
        let args = engine.build_args(&job(TargetFormat::Mp3, "/out/song.mp3"));

        assert!(has_pair(&args, "-c:a", "libmp3lame"));
        assert!(has_pair(&args, "-f", "mp3"));
        assert!(has_pair(&args, "-b:a", "192k"));
    }

    #[test]
    fn test_build_args_flac() {
        let engine = FfmpegEngine::new(EngineConfig::default().with_flac_compression(8));
        let args = engine.build_args(&job(TargetFormat::Flac, "/out/song.flac"));

        assert!(has_pair(&args, "-c:a", "flac"));
        assert!(has_pair(&args, "-compression_level", "8"));
        // Should not have bitrate for lossless
        assert!(!args.contains(&"-b:a".to_string()));
    }

    #[test]
    fn test_build_args_vorbis_progress_pipe() {
        let engine = FfmpegEngine::with_defaults();
        let args = engine.build_args(&job(TargetFormat::Vorbis, "/out/song.ogg"));

        assert!(has_pair(&args, "-c:a", "libvorbis"));
        assert!(has_pair(&args, "-f", "ogg"));
        assert!(has_pair(&args, "-progress", "pipe:2"));
        assert!(has_pair(&args, "-loglevel", "warning"));
    }

    #[test]
    fn test_metadata_args() {
        let tags: TagMap = [
            ("artist".to_string(), "Band".to_string()),
            ("title".to_string(), "Song".to_string()),
        ]
        .into();
        assert_eq!(
            metadata_args(&tags),
            vec!["-metadata", "artist=Band", "-metadata", "title=Song"]
        );
        assert!(metadata_args(&TagMap::new()).is_empty());
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "format": {
                "filename": "test.wav",
                "format_name": "wav",
                "duration": "180.5",
                "size": "31840000",
                "bit_rate": "1411200",
                "tags": { "TITLE": "Original", "artist": "Someone" }
            },
            "streams": [
                {
                    "index": 0,
                    "codec_type": "audio",
                    "codec_name": "pcm_s16le",
                    "bit_rate": "1411200",
                    "sample_rate": "44100",
                    "channels": 2
                }
            ]
        }"#;

        let info = FfmpegEngine::parse_probe_output(Path::new("test.wav"), json).unwrap();
        assert_eq!(info.container, "wav");
        assert!((info.duration_secs - 180.5).abs() < 0.01);
        assert_eq!(info.size_bytes, 31840000);
        assert_eq!(info.codec, "pcm_s16le");
        assert_eq!(info.bitrate_kbps, Some(1411));
        assert_eq!(info.sample_rate, Some(44100));
        assert_eq!(info.channels, Some(2));
        assert_eq!(info.tags.get("title").map(String::as_str), Some("Original"));
    }

    #[test]
    fn test_parse_probe_output_prefers_default_audio_stream() {
        let json = r#"{
            "format": { "format_name": "matroska,webm", "duration": "60.0" },
            "streams": [
                { "index": 0, "codec_type": "video", "codec_name": "h264" },
                { "index": 1, "codec_type": "audio", "codec_name": "aac", "disposition": { "default": 0 } },
                { "index": 2, "codec_type": "audio", "codec_name": "opus", "disposition": { "default": 1 } }
            ]
        }"#;

        let info = FfmpegEngine::parse_probe_output(Path::new("test.mkv"), json).unwrap();
        assert_eq!(info.container, "matroska");
        assert_eq!(info.stream_index, 2);
        assert_eq!(info.codec, "opus");
    }

    #[test]
    fn test_parse_probe_output_ogg_stream_tags() {
        let json = r#"{
            "format": { "format_name": "ogg", "duration": "2.0", "tags": { "ENCODER": "Lavf" } },
            "streams": [
                {
                    "index": 0,
                    "codec_type": "audio",
                    "codec_name": "opus",
                    "tags": { "TITLE": "Song", "ENCODER": "libopus" }
                }
            ]
        }"#;

        let info = FfmpegEngine::parse_probe_output(Path::new("song.ogg"), json).unwrap();
        assert_eq!(info.tags.get("title").map(String::as_str), Some("Song"));
        assert_eq!(info.tags.get("encoder").map(String::as_str), Some("Lavf"));
    }

    #[test]
    fn test_parse_probe_output_without_audio() {
        let json = r#"{
            "format": { "format_name": "png_pipe" },
            "streams": [ { "index": 0, "codec_type": "video", "codec_name": "png" } ]
        }"#;

        let err = FfmpegEngine::parse_probe_output(Path::new("cover.png"), json).unwrap_err();
        assert!(matches!(err, EngineError::NoAudioStream { .. }));
    }

    #[test]
    fn test_parse_probe_output_garbage() {
        let err = FfmpegEngine::parse_probe_output(Path::new("x"), "not json").unwrap_err();
        assert!(matches!(err, EngineError::ParseError { .. }));
    }

    #[tokio::test]
    async fn test_probe_missing_input() {
        let engine = FfmpegEngine::with_defaults();
        let err = engine.probe(Path::new("/no/such/file")).await.unwrap_err();
        assert!(matches!(err, EngineError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_validate_missing_binary() {
        let engine = FfmpegEngine::new(EngineConfig::with_paths(
            PathBuf::from("/definitely/not/ffmpeg"),
            PathBuf::from("/definitely/not/ffprobe"),
        ));
        let err = engine.validate().await.unwrap_err();
        assert!(matches!(err, EngineError::FfmpegNotFound { .. }));
    }
}
