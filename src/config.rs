use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::DEFAULT_CHANNEL_CAPACITY;

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_FRAME_WIDTH: u32 = 960;
const DEFAULT_FRAME_HEIGHT: u32 = 540;
const DEFAULT_WINDOW_SECS: u64 = 20;
const DEFAULT_RECORDING_PATH: &str = "recordings";

/// How long a session runs before stopping itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionDuration {
    Unbounded,
    Limited(Duration),
}

impl SessionDuration {
    /// `0` means unbounded.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::Unbounded
        } else {
            Self::Limited(Duration::from_secs(secs))
        }
    }

    pub fn limit(&self) -> Option<Duration> {
        match self {
            Self::Unbounded => None,
            Self::Limited(d) => Some(*d),
        }
    }
}

/// What a detection does while a recording window is already open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetriggerPolicy {
    /// Keep the original window; the detection is a no-op.
    #[default]
    Ignore,
    /// Restart the window clock on the open artifact.
    Extend,
}

impl std::str::FromStr for RetriggerPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "extend" => Ok(Self::Extend),
            other => Err(anyhow!("unknown retrigger policy '{}' (ignore|extend)", other)),
        }
    }
}

/// Internal pacing of the pipeline workers.
#[derive(Clone, Debug)]
pub struct PipelineTiming {
    pub channel_capacity: usize,
    /// Pause after each successful read; caps the ingestion rate.
    pub ingest_interval: Duration,
    /// Pause before reopening once `max_retries` consecutive failures occurred.
    pub reconnect_backoff: Duration,
    /// Pause before reopening after a single failure.
    pub retry_interval: Duration,
    /// Consumer wait per poll of an empty channel.
    pub poll_interval: Duration,
    /// Upper bound on a blocking source release.
    pub close_timeout: Duration,
    pub health_log_interval: Duration,
}

impl Default for PipelineTiming {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            ingest_interval: Duration::from_millis(10),
            reconnect_backoff: Duration::from_secs(2),
            retry_interval: Duration::from_millis(100),
            poll_interval: Duration::from_millis(20),
            close_timeout: Duration::from_secs(2),
            health_log_interval: Duration::from_secs(30),
        }
    }
}

/// Immutable per-camera session configuration.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub device_name: String,
    /// Monitoring (sub-stream) address.
    pub low_res_address: String,
    /// Recording (main-stream) address.
    pub high_res_address: String,
    pub max_retries: u32,
    /// Dimensions the detector expects.
    pub frame_width: u32,
    pub frame_height: u32,
    pub detection_enabled: bool,
    pub recording_enabled: bool,
    pub output_dir: PathBuf,
    pub session_duration: SessionDuration,
    pub recording_window: Duration,
    pub retrigger: RetriggerPolicy,
    pub timing: PipelineTiming,
}

impl CameraConfig {
    /// Defaults for everything except the identity and the two addresses.
    pub fn new(
        device_name: impl Into<String>,
        low_res_address: impl Into<String>,
        high_res_address: impl Into<String>,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            low_res_address: low_res_address.into(),
            high_res_address: high_res_address.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            detection_enabled: true,
            recording_enabled: true,
            output_dir: PathBuf::from(DEFAULT_RECORDING_PATH),
            session_duration: SessionDuration::Unbounded,
            recording_window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            retrigger: RetriggerPolicy::default(),
            timing: PipelineTiming::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.device_name.trim().is_empty() {
            return Err(anyhow!("device name must not be empty"));
        }
        if self
            .device_name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(anyhow!(
                "device name '{}' must be usable in a file name",
                self.device_name
            ));
        }
        if self.low_res_address.trim().is_empty() || self.high_res_address.trim().is_empty() {
            return Err(anyhow!(
                "camera '{}' needs both a low- and a high-resolution address",
                self.device_name
            ));
        }
        if self.recording_enabled && self.output_dir.as_os_str().is_empty() {
            return Err(anyhow!(
                "camera '{}': output directory required when recording is enabled",
                self.device_name
            ));
        }
        if self.recording_window.is_zero() {
            return Err(anyhow!("recording window must be greater than zero"));
        }
        if self.timing.channel_capacity == 0 {
            return Err(anyhow!("channel capacity must be greater than zero"));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(anyhow!("target frame dimensions must be non-zero"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// File + environment loading
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct RecorderConfigFile {
    recording_path: Option<PathBuf>,
    max_retries: Option<u32>,
    session_secs: Option<u64>,
    detection: Option<bool>,
    recording: Option<bool>,
    window_secs: Option<u64>,
    retrigger: Option<RetriggerPolicy>,
    frame: Option<FrameConfigFile>,
    cameras: Option<Vec<CameraConfigFile>>,
}

#[derive(Debug, Deserialize, Default)]
struct FrameConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CameraConfigFile {
    name: String,
    low_res_address: Option<String>,
    high_res_address: Option<String>,
    url: Option<String>,
    main_stream: Option<String>,
    sub_stream: Option<String>,
}

/// A camera given as a base URL plus main/sub stream channel suffixes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraEndpoint {
    pub name: String,
    pub low_res_address: String,
    pub high_res_address: String,
}

impl CameraEndpoint {
    /// Main stream records at high resolution, sub stream monitors at low.
    pub fn from_channels(name: &str, url: &str, main_stream: &str, sub_stream: &str) -> Self {
        Self {
            name: name.to_string(),
            low_res_address: format!("{}{}", url, sub_stream),
            high_res_address: format!("{}{}", url, main_stream),
        }
    }
}

/// Settings shared by every camera plus the camera list.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub recording_path: PathBuf,
    pub max_retries: u32,
    pub session_duration: SessionDuration,
    pub detection_enabled: bool,
    pub recording_enabled: bool,
    pub recording_window: Duration,
    pub retrigger: RetriggerPolicy,
    pub frame_width: u32,
    pub frame_height: u32,
    pub cameras: Vec<CameraEndpoint>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recording_path: PathBuf::from(DEFAULT_RECORDING_PATH),
            max_retries: DEFAULT_MAX_RETRIES,
            session_duration: SessionDuration::Unbounded,
            detection_enabled: true,
            recording_enabled: true,
            recording_window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            retrigger: RetriggerPolicy::Ignore,
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            cameras: Vec::new(),
        }
    }
}

impl RecorderConfig {
    /// File named by `IPCAM_CONFIG` (if any), then `IPCAM_*` overrides.
    ///
    /// Not validated yet: the caller may still add cameras from the command line.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("IPCAM_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Same as `load`, with the config file given explicitly.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: RecorderConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let cameras = file
            .cameras
            .unwrap_or_default()
            .into_iter()
            .map(camera_from_file)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            recording_path: file.recording_path.unwrap_or(defaults.recording_path),
            max_retries: file.max_retries.unwrap_or(defaults.max_retries),
            session_duration: file
                .session_secs
                .map(SessionDuration::from_secs)
                .unwrap_or(defaults.session_duration),
            detection_enabled: file.detection.unwrap_or(defaults.detection_enabled),
            recording_enabled: file.recording.unwrap_or(defaults.recording_enabled),
            recording_window: file
                .window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.recording_window),
            retrigger: file.retrigger.unwrap_or_default(),
            frame_width: file
                .frame
                .as_ref()
                .and_then(|f| f.width)
                .unwrap_or(defaults.frame_width),
            frame_height: file
                .frame
                .as_ref()
                .and_then(|f| f.height)
                .unwrap_or(defaults.frame_height),
            cameras,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("IPCAM_RECORDING_PATH") {
            if !path.trim().is_empty() {
                self.recording_path = PathBuf::from(path);
            }
        }
        if let Ok(retries) = std::env::var("IPCAM_MAX_RETRIES") {
            self.max_retries = retries
                .trim()
                .parse()
                .map_err(|_| anyhow!("IPCAM_MAX_RETRIES must be a non-negative integer"))?;
        }
        if let Ok(secs) = std::env::var("IPCAM_SESSION_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                anyhow!("IPCAM_SESSION_SECS must be an integer number of seconds (0 = unbounded)")
            })?;
            self.session_duration = SessionDuration::from_secs(secs);
        }
        if let Ok(secs) = std::env::var("IPCAM_WINDOW_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| anyhow!("IPCAM_WINDOW_SECS must be an integer number of seconds"))?;
            self.recording_window = Duration::from_secs(secs);
        }
        if let Ok(policy) = std::env::var("IPCAM_RETRIGGER") {
            self.retrigger = policy.parse()?;
        }
        if let Ok(flag) = std::env::var("IPCAM_DETECTION") {
            self.detection_enabled = parse_flag("IPCAM_DETECTION", &flag)?;
        }
        if let Ok(flag) = std::env::var("IPCAM_RECORDING") {
            self.recording_enabled = parse_flag("IPCAM_RECORDING", &flag)?;
        }
        Ok(())
    }

    /// Per-camera session configs. Validates the whole set.
    pub fn camera_configs(&self) -> Result<Vec<CameraConfig>> {
        if self.cameras.is_empty() {
            return Err(anyhow!("no cameras configured"));
        }
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.cameras.len());
        for camera in &self.cameras {
            if !seen.insert(camera.name.as_str()) {
                return Err(anyhow!("duplicate device name '{}'", camera.name));
            }
            let mut cfg = CameraConfig::new(
                camera.name.clone(),
                camera.low_res_address.clone(),
                camera.high_res_address.clone(),
            );
            cfg.max_retries = self.max_retries;
            cfg.frame_width = self.frame_width;
            cfg.frame_height = self.frame_height;
            cfg.detection_enabled = self.detection_enabled;
            cfg.recording_enabled = self.recording_enabled;
            cfg.output_dir = self.recording_path.clone();
            cfg.session_duration = self.session_duration;
            cfg.recording_window = self.recording_window;
            cfg.retrigger = self.retrigger;
            cfg.validate()?;
            out.push(cfg);
        }
        Ok(out)
    }
}

/// Zip base URLs, main/sub channels and device names into endpoints.
///
/// All lists must have the same length. Missing names default to `CAM_NN`.
pub fn endpoints_from_lists(
    urls: &[String],
    main_streams: &[String],
    sub_streams: &[String],
    names: &[String],
) -> Result<Vec<CameraEndpoint>> {
    if urls.len() != main_streams.len() || urls.len() != sub_streams.len() {
        return Err(anyhow!(
            "mismatch in camera urls ({}), main stream channels ({}) and sub stream channels ({})",
            urls.len(),
            main_streams.len(),
            sub_streams.len()
        ));
    }
    if !names.is_empty() && names.len() != urls.len() {
        return Err(anyhow!(
            "mismatch in camera urls ({}) and device names ({})",
            urls.len(),
            names.len()
        ));
    }
    Ok(urls
        .iter()
        .zip(main_streams)
        .zip(sub_streams)
        .enumerate()
        .map(|(i, ((url, main), sub))| {
            let name = names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("CAM_{:02}", i));
            CameraEndpoint::from_channels(&name, url, main, sub)
        })
        .collect())
}

fn camera_from_file(file: CameraConfigFile) -> Result<CameraEndpoint> {
    match (file.low_res_address, file.high_res_address) {
        (Some(low), Some(high)) => Ok(CameraEndpoint {
            name: file.name,
            low_res_address: low,
            high_res_address: high,
        }),
        (None, None) => {
            let (Some(url), Some(main), Some(sub)) = (file.url, file.main_stream, file.sub_stream)
            else {
                return Err(anyhow!(
                    "camera '{}' needs low/high addresses or url + main_stream + sub_stream",
                    file.name
                ));
            };
            Ok(CameraEndpoint::from_channels(&file.name, &url, &main, &sub))
        }
        _ => Err(anyhow!(
            "camera '{}' must set both low_res_address and high_res_address",
            file.name
        )),
    }
}

fn read_config_file(path: &Path) -> Result<RecorderConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean (true/false)", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_compose_url_and_channels() -> Result<()> {
        let endpoints = endpoints_from_lists(
            &["rtsp://10.0.0.5:554".to_string()],
            &["/Streaming/Channels/101".to_string()],
            &["/Streaming/Channels/102".to_string()],
            &[],
        )?;
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].name, "CAM_00");
        assert_eq!(
            endpoints[0].high_res_address,
            "rtsp://10.0.0.5:554/Streaming/Channels/101"
        );
        assert_eq!(
            endpoints[0].low_res_address,
            "rtsp://10.0.0.5:554/Streaming/Channels/102"
        );
        Ok(())
    }

    #[test]
    fn endpoints_reject_mismatched_lists() {
        let urls = vec!["rtsp://a".to_string(), "rtsp://b".to_string()];
        let one = vec!["/main".to_string()];
        let two = vec!["/sub".to_string(), "/sub".to_string()];
        assert!(endpoints_from_lists(&urls, &one, &two, &[]).is_err());
        assert!(endpoints_from_lists(&urls, &two, &two, &one).is_err());
    }

    #[test]
    fn recording_requires_output_dir() {
        let mut cfg = CameraConfig::new("front", "stub://low", "stub://high");
        cfg.output_dir = PathBuf::new();
        assert!(cfg.validate().is_err());
        cfg.recording_enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn duplicate_device_names_rejected() {
        let endpoint = CameraEndpoint::from_channels("front", "stub://cam", "/main", "/sub");
        let cfg = RecorderConfig {
            cameras: vec![endpoint.clone(), endpoint],
            ..RecorderConfig::default()
        };
        assert!(cfg.camera_configs().is_err());
    }

    #[test]
    fn zero_session_secs_is_unbounded() {
        assert_eq!(SessionDuration::from_secs(0), SessionDuration::Unbounded);
        assert_eq!(
            SessionDuration::from_secs(5).limit(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn camera_entry_accepts_channel_form() -> Result<()> {
        let file: RecorderConfigFile = serde_json::from_str(
            r#"{
                "cameras": [
                    { "name": "yard", "url": "rtsp://cam", "main_stream": "/101", "sub_stream": "/102" }
                ]
            }"#,
        )?;
        let cfg = RecorderConfig::from_file(file)?;
        assert_eq!(cfg.cameras[0].low_res_address, "rtsp://cam/102");
        Ok(())
    }
}
