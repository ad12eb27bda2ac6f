use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vidsplit_av::EncodingProfile;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub segmenting: SegmentingConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served as-is for unmatched routes (e.g. an upload form)
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Where uploaded sources are kept, one subdirectory per job
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Where produced segments are written, one subdirectory per job
    #[serde(default = "default_segments_dir")]
    pub segments_dir: PathBuf,

    /// Accepted source extensions, compared case-insensitively
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Upload size limit in MiB (default: 5000)
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_segments_dir() -> PathBuf {
    PathBuf::from("segments")
}

fn default_allowed_extensions() -> Vec<String> {
    vidsplit_common::paths::default_allowed_extensions()
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_upload_mb() -> u64 {
    5000
}

impl StorageConfig {
    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            segments_dir: default_segments_dir(),
            allowed_extensions: default_allowed_extensions(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SegmentingConfig {
    /// Segment length used when a request does not give one (default: 60)
    #[serde(default = "default_segment_secs")]
    pub default_segment_secs: u32,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Output container; also the artifact extension
    #[serde(default = "default_container")]
    pub container: String,

    /// Extra encoder arguments, e.g. `["-preset", "veryfast"]`
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Longest a single segment may take to encode (default: 3600)
    #[serde(default = "default_segment_timeout_secs")]
    pub segment_timeout_secs: u64,
}

fn default_segment_secs() -> u32 {
    vidsplit_av::segment::DEFAULT_SEGMENT_SECS
}

fn default_segment_timeout_secs() -> u64 {
    vidsplit_av::ffmpeg::DEFAULT_SEGMENT_TIMEOUT.as_secs()
}

fn default_video_codec() -> String {
    EncodingProfile::default().video_codec
}

fn default_audio_codec() -> String {
    EncodingProfile::default().audio_codec
}

fn default_container() -> String {
    EncodingProfile::default().container
}

impl SegmentingConfig {
    pub fn profile(&self) -> EncodingProfile {
        EncodingProfile {
            video_codec: self.video_codec.clone(),
            audio_codec: self.audio_codec.clone(),
            container: self.container.clone(),
            extra_args: self.extra_args.clone(),
        }
    }

    pub fn segment_timeout(&self) -> Duration {
        Duration::from_secs(self.segment_timeout_secs)
    }
}

impl Default for SegmentingConfig {
    fn default() -> Self {
        Self {
            default_segment_secs: default_segment_secs(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            container: default_container(),
            extra_args: Vec::new(),
            segment_timeout_secs: default_segment_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Jobs split at the same time (default: 1)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Finished jobs kept in history (default: 1000)
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Persist history and stats as JSON next to the segments directory
    #[serde(default)]
    pub persist: bool,
}

fn default_max_concurrent() -> usize {
    1
}

fn default_history_size() -> usize {
    1000
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            history_size: default_history_size(),
            persist: false,
        }
    }
}
