// Configuration system for GreenSort realtime

use crate::bins::Locale;
use crate::error::ConfigError;
use crate::geometry::FrameSize;
use crate::types::WasteClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP/websocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_sessions: usize,
    /// Largest accepted frame message, in bytes
    pub max_frame_bytes: usize,
    /// Resolution frames are captured at before inference
    pub reference_size: FrameSize,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_sessions: 100,
            max_frame_bytes: 5 * 1024 * 1024,
            reference_size: FrameSize::reference(),
            log_level: "info".to_string(),
        }
    }
}

/// Single-frame promotion policy for high-confidence detections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FastPathPolicy {
    pub enabled: bool,
    /// Confidence at or above which a detection replaces the candidate outright
    pub min_confidence: f32,
    /// Classes eligible for the override
    pub classes: Vec<WasteClass>,
}

impl Default for FastPathPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            min_confidence: 0.95,
            classes: vec![WasteClass::Battery],
        }
    }
}

impl FastPathPolicy {
    pub fn applies(&self, class: WasteClass, confidence: f32) -> bool {
        self.enabled && confidence >= self.min_confidence && self.classes.contains(&class)
    }
}

/// Display-only box smoothing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    /// EMA weight of the newest box
    pub alpha: f32,
    /// Below this IoU with the previous box the new box is drawn raw
    pub snap_iou: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 0.6,
            snap_iou: 0.3,
        }
    }
}

/// Stabilization engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Threshold for classes without an entry in `threshold_per_class`
    pub default_threshold: f32,
    pub threshold_per_class: BTreeMap<WasteClass, f32>,
    /// Agreeing frames needed to confirm a class
    pub streak_target: u32,
    /// Consecutive unsupported frames tolerated before giving up
    pub miss_budget: u32,
    /// Support removed from the candidate when a different class shows up
    pub switch_penalty: u32,
    /// Time without any qualifying detection after which a stable class is lost
    pub grace_period_ms: u64,
    /// Length of the rolling top-1 history
    pub history_window: usize,
    pub fast_path: FastPathPolicy,
    pub smoothing: SmoothingConfig,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        let mut threshold_per_class = BTreeMap::new();
        threshold_per_class.insert(WasteClass::Battery, 0.85);

        Self {
            default_threshold: 0.65,
            threshold_per_class,
            streak_target: 5,
            miss_budget: 5,
            switch_penalty: 1,
            grace_period_ms: 1500,
            history_window: 8,
            fast_path: FastPathPolicy::default(),
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl StabilizerConfig {
    pub fn threshold_for(&self, class: WasteClass) -> f32 {
        self.threshold_per_class
            .get(&class)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("stabilizer.default_threshold", self.default_threshold)?;
        for (class, threshold) in &self.threshold_per_class {
            check_unit(&format!("stabilizer.threshold_per_class.{}", class), *threshold)?;
        }
        if self.streak_target == 0 {
            return Err(ConfigError::ValidationError(
                "stabilizer.streak_target must be > 0".to_string(),
            ));
        }
        if self.miss_budget == 0 {
            return Err(ConfigError::ValidationError(
                "stabilizer.miss_budget must be > 0".to_string(),
            ));
        }
        if self.switch_penalty == 0 {
            return Err(ConfigError::ValidationError(
                "stabilizer.switch_penalty must be > 0".to_string(),
            ));
        }
        if self.history_window == 0 || self.history_window > 1024 {
            return Err(ConfigError::ValidationError(
                "stabilizer.history_window must be between 1 and 1024".to_string(),
            ));
        }
        check_unit("stabilizer.fast_path.min_confidence", self.fast_path.min_confidence)?;
        check_unit("stabilizer.smoothing.alpha", self.smoothing.alpha)?;
        check_unit("stabilizer.smoothing.snap_iou", self.smoothing.snap_iou)?;
        Ok(())
    }
}

/// Box size and shape limits for one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeConstraint {
    /// Largest plausible share of the frame
    pub max_area: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_aspect: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_aspect: Option<f32>,
}

impl SizeConstraint {
    pub const fn area(max_area: f32) -> Self {
        Self { max_area, min_aspect: None, max_aspect: None }
    }

    pub const fn with_aspect(max_area: f32, min_aspect: f32, max_aspect: f32) -> Self {
        Self {
            max_area,
            min_aspect: Some(min_aspect),
            max_aspect: Some(max_aspect),
        }
    }
}

/// Post-inference plausibility filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    /// Minimum share of the frame for any box
    pub min_area_ratio: f32,
    /// Stricter minimum for classes prone to background texture noise
    pub flat_min_area_ratio: f32,
    pub flat_classes: Vec<WasteClass>,
    pub constraints: BTreeMap<WasteClass, SizeConstraint>,
    /// Confidence needed to keep a box larger than its class allows
    pub oversize_min_confidence: f32,
    /// Confidence needed to keep a box outside its aspect bounds
    pub aspect_min_confidence: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let constraints = BTreeMap::from([
            (WasteClass::Battery, SizeConstraint::with_aspect(0.15, 0.3, 3.0)),
            (WasteClass::Metal, SizeConstraint::with_aspect(0.45, 0.2, 4.0)),
            (WasteClass::Biological, SizeConstraint::area(0.50)),
            (WasteClass::Paper, SizeConstraint::area(0.70)),
            (WasteClass::Cardboard, SizeConstraint::with_aspect(0.65, 0.4, 2.5)),
            (WasteClass::Plastic, SizeConstraint::with_aspect(0.50, 0.2, 3.0)),
            (WasteClass::Glass, SizeConstraint::with_aspect(0.45, 0.2, 3.0)),
            (WasteClass::Textile, SizeConstraint::area(0.60)),
            (WasteClass::Trash, SizeConstraint::area(0.45)),
        ]);

        Self {
            enabled: true,
            min_area_ratio: 0.01,
            flat_min_area_ratio: 0.02,
            flat_classes: vec![WasteClass::Paper, WasteClass::Cardboard, WasteClass::Textile],
            constraints,
            oversize_min_confidence: 0.85,
            aspect_min_confidence: 0.80,
        }
    }
}

/// Unit of the confidences a detector reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceScale {
    /// Decided once per response: percent if any value exceeds 1
    #[default]
    Auto,
    /// Already in [0, 1]
    Unit,
    /// 0 to 100
    Percent,
}

impl ConfidenceScale {
    /// Resolve `Auto` against every raw value of one response
    pub fn resolve(self, raw: &[f32]) -> Self {
        match self {
            ConfidenceScale::Auto if raw.iter().any(|c| *c > 1.0) => ConfidenceScale::Percent,
            ConfidenceScale::Auto => ConfidenceScale::Unit,
            scale => scale,
        }
    }

    /// Convert a raw value to [0, 1]; resolve `Auto` first
    pub fn normalize(self, raw: f32) -> f32 {
        match self {
            ConfidenceScale::Percent => raw / 100.0,
            _ => raw,
        }
    }
}

/// Inference adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// HTTP endpoint of the detector; `None` runs without a model
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
    /// Mean luma below which a frame is flagged as low light
    pub low_light_threshold: f32,
    pub max_detections: usize,
    pub confidence_scale: ConfidenceScale,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 2000,
            low_light_threshold: 80.0,
            max_detections: 100,
            confidence_scale: ConfidenceScale::Auto,
        }
    }
}

/// Consumer-side guidance debouncing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Delay between a confirmation and the guidance panel appearing
    pub show_delay_ms: u64,
    /// Minimum time guidance stays visible after support ends
    pub min_hold_ms: u64,
    pub locale: Locale,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            show_delay_ms: 50,
            min_hold_ms: 3000,
            locale: Locale::En,
        }
    }
}

/// Client transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub url: String,
    /// Capture cadence
    pub frame_interval_ms: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub connect_timeout_ms: u64,
    /// Consecutive failed attempts before the error is surfaced to the user
    pub error_after_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws/realtime-detect".to_string(),
            frame_interval_ms: 100,
            reconnect_base_ms: 1000,
            reconnect_max_ms: 10_000,
            connect_timeout_ms: 5000,
            error_after_attempts: 5,
        }
    }
}

/// Complete GreenSort configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GreensortConfig {
    pub server: ServerConfig,
    pub stabilizer: StabilizerConfig,
    pub filter: FilterConfig,
    pub inference: InferenceConfig,
    pub presentation: PresentationConfig,
    pub transport: TransportConfig,
}

impl GreensortConfig {
    /// Load configuration from a JSON or TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        if path.contains("..") {
            return Err(ConfigError::IoError(format!(
                "Path traversal detected: '{}'",
                path
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<GreensortConfig>(content) {
            return Ok(config);
        }

        toml::from_str::<GreensortConfig>(content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment overrides on top of this configuration
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("GREENSORT_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("GREENSORT_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                self.server.port = p;
            }
        }

        if let Ok(url) = std::env::var("GREENSORT_INFERENCE_URL") {
            if !url.is_empty() {
                self.inference.endpoint = Some(url);
            }
        }

        if let Ok(level) = std::env::var("GREENSORT_LOG_LEVEL") {
            self.server.log_level = level;
        }
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port cannot be 0".to_string(),
            ));
        }
        if self.server.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_sessions must be > 0".to_string(),
            ));
        }
        if self.server.max_frame_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_frame_bytes must be > 0".to_string(),
            ));
        }
        let size = self.server.reference_size;
        if size.width == 0 || size.height == 0 {
            return Err(ConfigError::ValidationError(
                "server.reference_size must be non-zero".to_string(),
            ));
        }

        self.stabilizer.validate()?;

        check_unit("filter.min_area_ratio", self.filter.min_area_ratio)?;
        check_unit("filter.flat_min_area_ratio", self.filter.flat_min_area_ratio)?;
        check_unit("filter.oversize_min_confidence", self.filter.oversize_min_confidence)?;
        check_unit("filter.aspect_min_confidence", self.filter.aspect_min_confidence)?;
        for (class, c) in &self.filter.constraints {
            check_unit(&format!("filter.constraints.{}.max_area", class), c.max_area)?;
            if let (Some(lo), Some(hi)) = (c.min_aspect, c.max_aspect) {
                if lo > hi {
                    return Err(ConfigError::ValidationError(format!(
                        "filter.constraints.{}: min_aspect greater than max_aspect",
                        class
                    )));
                }
            }
        }

        if self.inference.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "inference.timeout_ms must be > 0".to_string(),
            ));
        }
        if self.inference.max_detections == 0 {
            return Err(ConfigError::ValidationError(
                "inference.max_detections must be > 0".to_string(),
            ));
        }

        let t = &self.transport;
        if t.frame_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "transport.frame_interval_ms must be > 0".to_string(),
            ));
        }
        if t.reconnect_base_ms == 0 || t.reconnect_base_ms > t.reconnect_max_ms {
            return Err(ConfigError::ValidationError(
                "transport.reconnect_base_ms must be > 0 and <= reconnect_max_ms".to_string(),
            ));
        }
        if !t.url.starts_with("ws://") && !t.url.starts_with("wss://") {
            return Err(ConfigError::ValidationError(
                "transport.url must use ws:// or wss://".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "{} must be between 0 and 1 (got {})",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default_is_valid() {
        let config = GreensortConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stabilizer.threshold_for(WasteClass::Battery), 0.85);
        assert_eq!(config.stabilizer.threshold_for(WasteClass::Glass), 0.65);
        assert_eq!(config.server.reference_size, FrameSize::new(640, 480));
    }

    #[test]
    fn test_config_from_toml_partial() {
        let toml = r#"
            [server]
            port = 9000

            [stabilizer]
            streak_target = 3
            grace_period_ms = 800

            [stabilizer.threshold_per_class]
            battery = 0.9
            paper = 0.5
        "#;
        let config = GreensortConfig::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.stabilizer.streak_target, 3);
        assert_eq!(config.stabilizer.miss_budget, 5);
        assert_eq!(config.stabilizer.threshold_for(WasteClass::Paper), 0.5);
        assert_eq!(config.stabilizer.threshold_for(WasteClass::Battery), 0.9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{"transport": {"reconnect_base_ms": 500, "reconnect_max_ms": 4000}}"#;
        let config = GreensortConfig::from_str(json).unwrap();
        assert_eq!(config.transport.reconnect_base_ms, 500);
        assert_eq!(config.transport.reconnect_max_ms, 4000);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[presentation]\nmin_hold_ms = 1200\nlocale = \"vi\"").unwrap();
        let config = GreensortConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.presentation.min_hold_ms, 1200);
        assert_eq!(config.presentation.locale, Locale::Vi);
    }

    #[test]
    fn test_config_rejects_traversal_and_garbage() {
        assert!(matches!(
            GreensortConfig::from_file("../etc/passwd"),
            Err(ConfigError::IoError(_))
        ));
        assert!(matches!(
            GreensortConfig::from_str("[[[ not a config"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validation_thresholds() {
        let mut config = GreensortConfig::default();
        config.stabilizer.threshold_per_class.insert(WasteClass::Glass, 1.5);
        assert!(config.validate().is_err());

        let mut config = GreensortConfig::default();
        config.stabilizer.default_threshold = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_counters() {
        let mut config = GreensortConfig::default();
        config.stabilizer.streak_target = 0;
        assert!(config.validate().is_err());

        let mut config = GreensortConfig::default();
        config.stabilizer.miss_budget = 0;
        assert!(config.validate().is_err());

        let mut config = GreensortConfig::default();
        config.stabilizer.switch_penalty = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_transport() {
        let mut config = GreensortConfig::default();
        config.transport.reconnect_base_ms = 20_000;
        assert!(config.validate().is_err());

        let mut config = GreensortConfig::default();
        config.transport.url = "http://localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fast_path_policy() {
        let mut policy = FastPathPolicy::default();
        assert!(!policy.applies(WasteClass::Battery, 0.99));
        policy.enabled = true;
        assert!(policy.applies(WasteClass::Battery, 0.99));
        assert!(!policy.applies(WasteClass::Battery, 0.90));
        assert!(!policy.applies(WasteClass::Plastic, 0.99));
    }

    #[test]
    fn test_confidence_scale() {
        let config: InferenceConfig =
            serde_json::from_str(r#"{"confidence_scale": "percent"}"#).unwrap();
        assert_eq!(config.confidence_scale, ConfidenceScale::Percent);
        assert_eq!(InferenceConfig::default().confidence_scale, ConfidenceScale::Auto);

        // one value above 1 puts the whole response on the percent scale
        let auto = ConfidenceScale::Auto.resolve(&[92.0, 0.8]);
        assert_eq!(auto, ConfidenceScale::Percent);
        assert!((auto.normalize(0.8) - 0.008).abs() < 1e-6);
        assert_eq!(ConfidenceScale::Auto.resolve(&[0.9, 0.4]), ConfidenceScale::Unit);
        assert_eq!(ConfidenceScale::Unit.resolve(&[92.0]), ConfidenceScale::Unit);
        assert_eq!(ConfidenceScale::Unit.normalize(0.8), 0.8);
    }
}
