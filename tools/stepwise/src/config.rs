use crate::errors::StepwiseError;
use crate::logging::{DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub playback: PlaybackConfig,
    pub patterns: PatternConfig,
    pub suggestions: SuggestionConfig,
    pub archive: ArchiveConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    pub default_speed: f64,
    pub skip_errors: bool,
    pub pause_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub per_action_cost_ms: u64,
    pub automated_cost_ms: u64,
    pub prediction_window: usize,
    pub confidence_divisor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestionConfig {
    pub min_occurrences: u32,
    pub high_priority_occurrences: u32,
    pub complex_workflow_steps: usize,
    pub slow_step_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub path: PathBuf,
    pub persist_on_stop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_speed: 1.0,
            skip_errors: false,
            pause_on_error: false,
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_length: 2,
            max_length: 5,
            per_action_cost_ms: 1000,
            automated_cost_ms: 100,
            prediction_window: 3,
            confidence_divisor: 10.0,
        }
    }
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            high_priority_occurrences: 3,
            complex_workflow_steps: 10,
            slow_step_ms: 5000.0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            patterns: PatternConfig::default(),
            suggestions: SuggestionConfig::default(),
            archive: ArchiveConfig {
                path: PathBuf::from(".cache/stepwise/recordings.sqlite"),
                persist_on_stop: true,
            },
            logging: LoggingConfig {
                path: PathBuf::from(".cache/stepwise/logs/run.jsonl"),
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    playback: Option<PartialPlaybackConfig>,
    patterns: Option<PartialPatternConfig>,
    suggestions: Option<PartialSuggestionConfig>,
    archive: Option<PartialArchiveConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialPlaybackConfig {
    default_speed: Option<f64>,
    skip_errors: Option<bool>,
    pause_on_error: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialPatternConfig {
    min_length: Option<usize>,
    max_length: Option<usize>,
    per_action_cost_ms: Option<u64>,
    automated_cost_ms: Option<u64>,
    prediction_window: Option<usize>,
    confidence_divisor: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSuggestionConfig {
    min_occurrences: Option<u32>,
    high_priority_occurrences: Option<u32>,
    complex_workflow_steps: Option<usize>,
    slow_step_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialArchiveConfig {
    path: Option<PathBuf>,
    persist_on_stop: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

pub fn load_config(
    overrides: &CliOverrides,
    fs: &dyn FileSystem,
) -> Result<AppConfig, StepwiseError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        cfg = parse_config(&file_contents)?;
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Parse a TOML document on top of the defaults. Missing keys keep their default.
pub fn parse_config(contents: &str) -> Result<AppConfig, StepwiseError> {
    let partial: PartialAppConfig =
        toml::from_str(contents).map_err(|e| StepwiseError::ConfigParse(e.to_string()))?;
    let mut cfg = AppConfig::default();
    merge_partial_config(&mut cfg, partial);
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(playback) = partial.playback {
        if let Some(value) = playback.default_speed {
            cfg.playback.default_speed = value;
        }
        if let Some(value) = playback.skip_errors {
            cfg.playback.skip_errors = value;
        }
        if let Some(value) = playback.pause_on_error {
            cfg.playback.pause_on_error = value;
        }
    }

    if let Some(patterns) = partial.patterns {
        if let Some(value) = patterns.min_length {
            cfg.patterns.min_length = value;
        }
        if let Some(value) = patterns.max_length {
            cfg.patterns.max_length = value;
        }
        if let Some(value) = patterns.per_action_cost_ms {
            cfg.patterns.per_action_cost_ms = value;
        }
        if let Some(value) = patterns.automated_cost_ms {
            cfg.patterns.automated_cost_ms = value;
        }
        if let Some(value) = patterns.prediction_window {
            cfg.patterns.prediction_window = value;
        }
        if let Some(value) = patterns.confidence_divisor {
            cfg.patterns.confidence_divisor = value;
        }
    }

    if let Some(suggestions) = partial.suggestions {
        if let Some(value) = suggestions.min_occurrences {
            cfg.suggestions.min_occurrences = value;
        }
        if let Some(value) = suggestions.high_priority_occurrences {
            cfg.suggestions.high_priority_occurrences = value;
        }
        if let Some(value) = suggestions.complex_workflow_steps {
            cfg.suggestions.complex_workflow_steps = value;
        }
        if let Some(value) = suggestions.slow_step_ms {
            cfg.suggestions.slow_step_ms = value;
        }
    }

    if let Some(archive) = partial.archive {
        if let Some(value) = archive.path {
            cfg.archive.path = value;
        }
        if let Some(value) = archive.persist_on_stop {
            cfg.archive.persist_on_stop = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.path {
            cfg.logging.path = value;
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(path) = &overrides.archive_path {
        cfg.archive.path = path.clone();
    }
}

pub fn validate_config(cfg: &AppConfig) -> Result<(), StepwiseError> {
    if !(cfg.playback.default_speed.is_finite() && cfg.playback.default_speed > 0.0) {
        return Err(StepwiseError::InvalidConfig(
            "playback.default_speed must be greater than zero".to_string(),
        ));
    }

    let patterns = &cfg.patterns;
    if patterns.min_length < 2 {
        return Err(StepwiseError::InvalidConfig(
            "patterns.min_length must be at least 2".to_string(),
        ));
    }
    if patterns.max_length < patterns.min_length {
        return Err(StepwiseError::InvalidConfig(
            "patterns.max_length must not be below patterns.min_length".to_string(),
        ));
    }
    if patterns.automated_cost_ms > patterns.per_action_cost_ms * patterns.min_length as u64 {
        return Err(StepwiseError::InvalidConfig(
            "patterns.automated_cost_ms exceeds the manual cost of the shortest pattern"
                .to_string(),
        ));
    }
    if patterns.prediction_window == 0 {
        return Err(StepwiseError::InvalidConfig(
            "patterns.prediction_window must be greater than zero".to_string(),
        ));
    }
    if !(patterns.confidence_divisor.is_finite() && patterns.confidence_divisor > 0.0) {
        return Err(StepwiseError::InvalidConfig(
            "patterns.confidence_divisor must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

pub fn resolve_against(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeFileSystem;

    #[test]
    fn defaults_mirror_detector_heuristics() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.patterns.min_length, 2);
        assert_eq!(cfg.patterns.max_length, 5);
        assert_eq!(cfg.patterns.per_action_cost_ms, 1000);
        assert_eq!(cfg.patterns.automated_cost_ms, 100);
        assert_eq!(cfg.suggestions.complex_workflow_steps, 10);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let fs = FakeFileSystem::with_file(
            "/stepwise.toml",
            "[playback]\ndefault_speed = 2.5\n\n[patterns]\nmax_length = 4\n",
        );
        let cfg = load_config(
            &CliOverrides {
                config_path: Some(PathBuf::from("/stepwise.toml")),
                ..CliOverrides::default()
            },
            &fs,
        )
        .expect("load");
        assert_eq!(cfg.playback.default_speed, 2.5);
        assert_eq!(cfg.patterns.max_length, 4);
        assert_eq!(cfg.patterns.min_length, 2);
        assert!(!cfg.playback.skip_errors);
    }

    #[test]
    fn cli_archive_path_wins_over_file_value() {
        let fs = FakeFileSystem::with_file(
            "/c.toml",
            "[archive]\npath = \"from-file.sqlite\"\npersist_on_stop = false\n",
        );
        let cfg = load_config(
            &CliOverrides {
                config_path: Some(PathBuf::from("/c.toml")),
                archive_path: Some(PathBuf::from("/tmp/a.sqlite")),
            },
            &fs,
        )
        .expect("load");
        assert_eq!(cfg.archive.path, PathBuf::from("/tmp/a.sqlite"));
        assert!(!cfg.archive.persist_on_stop);
    }

    #[test]
    fn rejects_non_positive_speed_and_bad_windows() {
        let mut cfg = AppConfig::default();
        cfg.playback.default_speed = 0.0;
        assert!(matches!(
            validate_config(&cfg),
            Err(StepwiseError::InvalidConfig(message)) if message.contains("default_speed")
        ));

        let mut cfg = AppConfig::default();
        cfg.patterns.max_length = 1;
        assert!(validate_config(&cfg).is_err());

        let mut cfg = AppConfig::default();
        cfg.patterns.min_length = 1;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn unknown_sections_are_a_parse_error() {
        let err = parse_config("[recorder]\nenabled = true\n").expect_err("unknown section");
        assert!(matches!(err, StepwiseError::ConfigParse(_)));
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let fs = FakeFileSystem::default();
        let err = load_config(
            &CliOverrides {
                config_path: Some(PathBuf::from("/nope.toml")),
                ..CliOverrides::default()
            },
            &fs,
        )
        .expect_err("missing");
        assert!(matches!(err, StepwiseError::Io(_)));
    }
}
