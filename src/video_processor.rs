//! # Video Processing Module
//!
//! Questo modulo gestisce l'ottimizzazione di tutti i formati video supportati.
//!
//! ## Responsabilità:
//! - Analisi proprietà video con ffprobe (`MediaInfo`)
//! - Costruzione dei parametri FFmpeg come funzione pura (testabile senza encoder)
//! - Esecuzione di FFmpeg come sottoprocesso con progress in streaming
//! - Mappatura dell'exit code su successo / errore
//!
//! ## Formati supportati:
//! - **Input**: MP4, AVI, MOV, MKV, WebM, FLV, WMV, M4V
//! - **Output**: MP4 (H.264 + AAC, faststart, yuv420p) per massima compatibilità
//!
//! ## Pipeline di compressione:
//! 1. Analizza il video con ffprobe (best-effort, default 1920x1080 @ 30fps se fallisce)
//! 2. Costruisce gli argomenti:
//!    - Codec video: libx264 con CRF, preset, maxrate e bufsize
//!    - Scale filter solo se la sorgente supera max_width/max_height (mai upscaling)
//!    - `-r` solo se la sorgente supera max_fps
//!    - Audio ricodificato solo se presente
//! 3. Esegue FFmpeg e segue `time=` sullo stderr
//! 4. Exit code 0 = successo, altrimenti errore con il codice
//!
//! ## Controllo qualità (CRF):
//! - 0-17: Visualmente lossless (file grandi)
//! - 18-23: Alta qualità (default 23)
//! - 24-28: Buona qualità, file più piccoli
//! - 29+: Qualità bassa
//!
//! ## Esempio:
//! ```ignore
//! let processor = VideoProcessor::new(settings, "ffmpeg", "ffprobe");
//! let info = processor.probe(&video_path).await;
//! let optimized = processor.optimize(&video_path, &temp_output).await?;
//! ```

use crate::config::VideoSettings;
use crate::error::OptimizeError;
use crate::optimizer::codec::OptimizedFile;
use crate::platform::PlatformCommands;
use crate::progress::ProgressManager;
use crate::utils::to_string_vec;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Number of trailing stderr lines kept for failure reports
const STDERR_TAIL_LINES: usize = 8;

/// Description of a video source, produced by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Seconds
    pub duration: f64,
    pub has_audio: bool,
    /// Bits per second, 0 when unknown
    pub bitrate: u64,
}

impl Default for MediaInfo {
    /// Assumed when probing fails
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30.0,
            duration: 0.0,
            has_audio: true,
            bitrate: 0,
        }
    }
}

/// Handles video probing and encoding
#[derive(Debug, Clone)]
pub struct VideoProcessor {
    settings: VideoSettings,
    ffmpeg: String,
    ffprobe: String,
}

impl VideoProcessor {
    pub fn new(settings: VideoSettings, ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            settings,
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Fail fast when ffmpeg cannot be executed
    pub async fn check_dependencies(&self) -> Result<(), OptimizeError> {
        PlatformCommands::instance().require(&self.ffmpeg, "ffmpeg").await
    }

    /// Probe a video with ffprobe. Best-effort: returns defaults on any failure.
    pub async fn probe(&self, video_path: &Path) -> MediaInfo {
        let platform = PlatformCommands::instance();
        let ffprobe_cmd = platform.get_command(&self.ffprobe);

        let output = Command::new(ffprobe_cmd)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(video_path)
            .stdin(Stdio::null())
            .output()
            .await;

        let parsed = match output {
            Ok(output) if output.status.success() => {
                parse_probe_output(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                debug!("ffprobe exited with {:?}", output.status.code());
                None
            }
            Err(e) => {
                debug!("Failed to execute {}: {}", ffprobe_cmd, e);
                None
            }
        };

        parsed.unwrap_or_else(|| {
            warn!(
                "⚠️  Could not get video info for {}, using defaults",
                video_path.file_name().unwrap_or_default().to_string_lossy()
            );
            MediaInfo::default()
        })
    }

    /// Probe, encode into `output_path` and report the sizes
    pub async fn optimize(&self, input_path: &Path, output_path: &Path) -> Result<OptimizedFile, OptimizeError> {
        let original_size = tokio::fs::metadata(input_path).await?.len();

        let info = self.probe(input_path).await;
        info!(
            "📊 Video info: {}x{}, {:.1}fps, {:.1}s",
            info.width, info.height, info.fps, info.duration
        );

        let args = build_ffmpeg_args(input_path, output_path, &info, &self.settings);
        self.run_ffmpeg(&args, input_path).await?;

        let optimized_size = tokio::fs::metadata(output_path)
            .await
            .map(|m| m.len())
            .map_err(|_| OptimizeError::EmptyOutput(output_path.to_path_buf()))?;

        Ok(OptimizedFile {
            path: output_path.to_path_buf(),
            original_size,
            optimized_size,
        })
    }

    /// Run ffmpeg, streaming its progress; nonzero exit becomes an error with the code
    async fn run_ffmpeg(&self, args: &[String], input_path: &Path) -> Result<(), OptimizeError> {
        let platform = PlatformCommands::instance();
        let ffmpeg_cmd = platform.get_command(&self.ffmpeg);
        let file_name = input_path.file_name().unwrap_or_default().to_string_lossy().to_string();

        debug!("🎬 {} {}", ffmpeg_cmd, args.join(" "));
        let start_time = std::time::Instant::now();

        let mut child = Command::new(ffmpeg_cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let spinner = ProgressManager::spinner(&format!("⏳ Encoding {}...", file_name));
        let mut tail: Vec<String> = Vec::new();

        if let Some(mut stderr) = child.stderr.take() {
            let mut buf = [0u8; 4096];
            let mut pending = String::new();

            loop {
                let read = stderr.read(&mut buf).await?;
                if read == 0 {
                    break;
                }
                pending.push_str(&String::from_utf8_lossy(&buf[..read]));

                // ffmpeg rewrites its status line with '\r'
                while let Some(pos) = pending.find(['\r', '\n']) {
                    let line: String = pending.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(time) = parse_progress_time(line) {
                        spinner.set_message(format!("⏳ Encoding {}... {}", file_name, time));
                    }
                    push_tail(&mut tail, line);
                }
            }
            if !pending.trim().is_empty() {
                push_tail(&mut tail, pending.trim());
            }
        }

        let status = child.wait().await?;
        spinner.finish_and_clear();
        let elapsed = start_time.elapsed().as_secs_f64();

        if status.success() {
            info!("✅ Video encode of {} completed in {:.1}s", file_name, elapsed);
            return Ok(());
        }

        warn!(
            "❌ FFmpeg failed on {} after {:.1}s:\n{}",
            file_name,
            elapsed,
            tail.join("\n")
        );
        match status.code() {
            Some(code) => Err(OptimizeError::FFmpegExit(code)),
            None => Err(OptimizeError::FFmpegTerminated),
        }
    }
}

fn push_tail(tail: &mut Vec<String>, line: &str) {
    if tail.len() == STDERR_TAIL_LINES {
        tail.remove(0);
    }
    tail.push(line.to_string());
}

/// Build the ffmpeg argument list for one encode.
///
/// Pure function: the order of the returned arguments is the order passed to
/// the encoder.
pub fn build_ffmpeg_args(
    input_path: &Path,
    output_path: &Path,
    info: &MediaInfo,
    settings: &VideoSettings,
) -> Vec<String> {
    let mut args = vec!["-i".to_string(), input_path.to_string_lossy().to_string()];
    args.extend(crate::args![
        "-c:v", "libx264",
        "-crf", settings.crf,
        "-preset", settings.preset,
        "-maxrate", settings.max_bitrate,
        "-bufsize", settings.buffer_size,
    ]);

    if info.width > settings.max_width || info.height > settings.max_height {
        args.push("-vf".to_string());
        args.push(format!(
            "scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease",
            settings.max_width, settings.max_height
        ));
    }

    if info.fps > settings.max_fps {
        args.push("-r".to_string());
        args.push(format_fps(settings.max_fps));
    }

    if info.has_audio {
        args.extend(crate::args![
            "-c:a", settings.audio_codec,
            "-b:a", settings.audio_bitrate,
        ]);
    }

    args.extend(to_string_vec(["-movflags", "+faststart", "-pix_fmt", "yuv420p", "-y"]));
    args.push(output_path.to_string_lossy().to_string());

    args
}

fn format_fps(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{}", fps)
    }
}

/// Parse ffprobe's JSON document into a [`MediaInfo`]
pub fn parse_probe_output(json: &str) -> Option<MediaInfo> {
    let info: serde_json::Value = serde_json::from_str(json).ok()?;

    let format = &info["format"];
    let duration = format["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let bitrate = format["bit_rate"]
        .as_str()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    let streams = info["streams"].as_array()?;
    let video_stream = streams.iter().find(|s| s["codec_type"] == "video");
    let has_audio = streams.iter().any(|s| s["codec_type"] == "audio");

    let (width, height, fps) = match video_stream {
        Some(stream) => (
            stream["width"].as_u64().unwrap_or(0) as u32,
            stream["height"].as_u64().unwrap_or(0) as u32,
            stream["r_frame_rate"]
                .as_str()
                .and_then(parse_frame_rate)
                .unwrap_or(30.0),
        ),
        None => (0, 0, 30.0),
    };

    Some(MediaInfo {
        width,
        height,
        fps,
        duration,
        has_audio,
        bitrate,
    })
}

/// Parse an ffprobe rational such as `30000/1001` (or a plain number)
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => rate.trim().parse().ok(),
    }
}

/// Extract the `time=HH:MM:SS.xx` field from an ffmpeg status line
pub fn parse_progress_time(line: &str) -> Option<&str> {
    let start = line.find("time=")? + "time=".len();
    let rest = &line[start..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let time = &rest[..end];
    if time.is_empty() {
        None
    } else {
        Some(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn info(width: u32, height: u32, fps: f64, has_audio: bool) -> MediaInfo {
        MediaInfo {
            width,
            height,
            fps,
            duration: 12.0,
            has_audio,
            bitrate: 4_000_000,
        }
    }

    #[test]
    fn test_args_for_small_source_skip_scale_and_fps() {
        let args = build_ffmpeg_args(
            Path::new("in.mov"),
            Path::new("out.mp4"),
            &info(1280, 720, 25.0, true),
            &VideoSettings::default(),
        );

        assert_eq!(
            args,
            vec![
                "-i", "in.mov", "-c:v", "libx264", "-crf", "23", "-preset", "medium",
                "-maxrate", "2M", "-bufsize", "4M", "-c:a", "aac", "-b:a", "128k",
                "-movflags", "+faststart", "-pix_fmt", "yuv420p", "-y", "out.mp4",
            ]
        );
    }

    #[test]
    fn test_args_for_large_fast_source_add_scale_and_rate() {
        let args = build_ffmpeg_args(
            Path::new("in.mkv"),
            Path::new("out.mp4"),
            &info(3840, 2160, 60.0, true),
            &VideoSettings::default(),
        );

        let vf = args.iter().position(|a| a == "-vf").expect("scale filter");
        assert_eq!(
            args[vf + 1],
            "scale='min(1920,iw)':'min(1080,ih)':force_original_aspect_ratio=decrease"
        );
        let r = args.iter().position(|a| a == "-r").expect("frame rate cap");
        assert_eq!(args[r + 1], "30");
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_args_scale_when_only_height_exceeds() {
        let args = build_ffmpeg_args(
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            &info(1080, 1920, 30.0, true),
            &VideoSettings::default(),
        );
        assert!(args.iter().any(|a| a == "-vf"));
        assert!(!args.iter().any(|a| a == "-r"));
    }

    #[test]
    fn test_args_without_audio_omit_audio_pipeline() {
        let args = build_ffmpeg_args(
            Path::new("in.webm"),
            Path::new("out.mp4"),
            &info(640, 360, 30.0, false),
            &VideoSettings::default(),
        );
        assert!(!args.iter().any(|a| a == "-c:a" || a == "-b:a"));
        assert!(args.iter().any(|a| a == "+faststart"));
        assert!(args.iter().any(|a| a == "yuv420p"));
    }

    #[test]
    fn test_args_follow_settings() {
        let settings = VideoSettings {
            crf: 28,
            preset: "slow".to_string(),
            max_fps: 24.0,
            ..VideoSettings::default()
        };
        let args = build_ffmpeg_args(
            &PathBuf::from("a.avi"),
            &PathBuf::from("b.mp4"),
            &info(640, 360, 29.97, false),
            &settings,
        );
        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "28");
        let preset = args.iter().position(|a| a == "-preset").unwrap();
        assert_eq!(args[preset + 1], "slow");
        let r = args.iter().position(|a| a == "-r").unwrap();
        assert_eq!(args[r + 1], "24");
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "streams": [
                { "codec_type": "video", "width": 3840, "height": 2160, "r_frame_rate": "60000/1001" },
                { "codec_type": "audio", "codec_name": "aac" }
            ],
            "format": { "duration": "42.5", "bit_rate": "15000000" }
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.width, 3840);
        assert_eq!(info.height, 2160);
        assert!((info.fps - 59.94).abs() < 0.01);
        assert_eq!(info.duration, 42.5);
        assert!(info.has_audio);
        assert_eq!(info.bitrate, 15_000_000);
    }

    #[test]
    fn test_parse_probe_output_without_audio() {
        let json = r#"{
            "streams": [ { "codec_type": "video", "width": 640, "height": 480, "r_frame_rate": "24/1" } ],
            "format": {}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!(!info.has_audio);
        assert_eq!(info.duration, 0.0);
        assert_eq!(info.bitrate, 0);
        assert_eq!(parse_probe_output("not json"), None);
    }

    #[test]
    fn test_parse_progress_time() {
        let line = "frame=  240 fps=48 q=28.0 size=    512kB time=00:00:08.00 bitrate= 524.3kbits/s speed=1.6x";
        assert_eq!(parse_progress_time(line), Some("00:00:08.00"));
        assert_eq!(parse_progress_time("Press [q] to stop"), None);
    }

    #[tokio::test]
    async fn test_probe_falls_back_to_defaults() {
        let processor = VideoProcessor::new(
            VideoSettings::default(),
            "/nonexistent/ffmpeg",
            "/nonexistent/ffprobe",
        );
        let info = processor.probe(Path::new("/nonexistent/clip.mp4")).await;
        assert_eq!(info, MediaInfo::default());
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!(info.has_audio);
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_reported() {
        let processor = VideoProcessor::new(
            VideoSettings::default(),
            "/nonexistent/ffmpeg",
            "/nonexistent/ffprobe",
        );
        let err = processor.check_dependencies().await.unwrap_err();
        assert!(matches!(err, OptimizeError::MissingDependency { ref tool, .. } if tool == "ffmpeg"));
    }
}
