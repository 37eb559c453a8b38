use anyhow::{bail, Context, Result};
use rollcall_core::acquisition::{MAX_SAMPLES, SAMPLE_CADENCE};
use rollcall_core::recognizer::DEFAULT_NEIGHBORS;
use rollcall_core::{DetectorParams, MatchRule, SamplingPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";
const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";

/// Runtime configuration: defaults, then `rollcall.toml`, then `ROLLCALL_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the label store and the detector model.
    pub data_dir: PathBuf,
    /// Directory holding the per-day attendance ledgers.
    pub attendance_dir: PathBuf,
    /// V4L2 device path.
    pub camera_device: String,
    /// SCRFD ONNX model path.
    pub detector_model: PathBuf,
    pub max_samples: usize,
    /// Only every n-th frame contributes enrollment samples.
    pub sample_cadence: usize,
    /// k for the nearest-neighbor vote.
    pub neighbors: usize,
    pub detector_confidence: f32,
    pub detector_nms: f32,
    pub ledger_match: MatchRule,
    /// Pause after a confirm reaches the ledger.
    pub confirm_cooldown: Duration,
    /// External text-to-speech program; messages are printed when unset.
    pub tts_command: Option<String>,
}

/// Optional overrides read from the TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub attendance_dir: Option<PathBuf>,
    pub camera_device: Option<String>,
    pub detector_model: Option<PathBuf>,
    pub max_samples: Option<usize>,
    pub sample_cadence: Option<usize>,
    pub neighbors: Option<usize>,
    pub detector_confidence: Option<f32>,
    pub detector_nms: Option<f32>,
    pub ledger_match: Option<MatchRule>,
    pub confirm_cooldown_ms: Option<u64>,
    pub tts_command: Option<String>,
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` (or `./rollcall.toml` if present) and the environment.
    pub fn load() -> Result<Self> {
        let file = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Some(read_file(Path::new(&path))?),
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Some(read_file(Path::new(DEFAULT_CONFIG_FILE))?)
            }
            Err(_) => None,
        };
        Self::from_sources(file.unwrap_or_default(), |key| std::env::var(key).ok())
    }

    /// Merge file values and environment lookups over the defaults.
    pub fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = env("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from("data"));

        let detector_model = env("ROLLCALL_DETECTOR_MODEL")
            .map(PathBuf::from)
            .or(file.detector_model)
            .unwrap_or_else(|| data_dir.join(DETECTOR_MODEL_FILE));

        let config = Self {
            attendance_dir: env("ROLLCALL_ATTENDANCE_DIR")
                .map(PathBuf::from)
                .or(file.attendance_dir)
                .unwrap_or_else(|| PathBuf::from("Attendance")),
            camera_device: env("ROLLCALL_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            detector_model,
            data_dir,
            max_samples: env_parse(&env, "ROLLCALL_MAX_SAMPLES")
                .or(file.max_samples)
                .unwrap_or(MAX_SAMPLES),
            sample_cadence: env_parse(&env, "ROLLCALL_SAMPLE_CADENCE")
                .or(file.sample_cadence)
                .unwrap_or(SAMPLE_CADENCE),
            neighbors: env_parse(&env, "ROLLCALL_NEIGHBORS")
                .or(file.neighbors)
                .unwrap_or(DEFAULT_NEIGHBORS),
            detector_confidence: env_parse(&env, "ROLLCALL_DETECTOR_CONFIDENCE")
                .or(file.detector_confidence)
                .unwrap_or(DetectorParams::default().confidence_threshold),
            detector_nms: env_parse(&env, "ROLLCALL_DETECTOR_NMS")
                .or(file.detector_nms)
                .unwrap_or(DetectorParams::default().nms_threshold),
            ledger_match: env_parse(&env, "ROLLCALL_LEDGER_MATCH")
                .or(file.ledger_match)
                .unwrap_or_default(),
            confirm_cooldown: Duration::from_millis(
                env_parse(&env, "ROLLCALL_CONFIRM_COOLDOWN_MS")
                    .or(file.confirm_cooldown_ms)
                    .unwrap_or(2000),
            ),
            tts_command: env("ROLLCALL_TTS_COMMAND")
                .or(file.tts_command)
                .filter(|c| !c.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.sampling_policy().validate()?;
        if self.neighbors == 0 {
            bail!("neighbors must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.detector_confidence) || !(0.0..=1.0).contains(&self.detector_nms) {
            bail!("detector thresholds must lie in [0, 1]");
        }
        Ok(())
    }

    pub fn sampling_policy(&self) -> SamplingPolicy {
        SamplingPolicy {
            max_samples: self.max_samples,
            cadence: self.sample_cadence,
        }
    }

    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            confidence_threshold: self.detector_confidence,
            nms_threshold: self.detector_nms,
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}
