use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::connection::ConnectionSettings;
use crate::normalizer::FeatureLayout;
use crate::types::{LABEL_NO_HAND, LABEL_NOT_RECOGNIZED};

pub const DEFAULT_GESTURES: [&str; 3] = ["wave", "swipe_left", "swipe_right"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sequence_length must be greater than 0")]
    ZeroSequenceLength,

    #[error("window_stride must be greater than 0")]
    ZeroStride,

    #[error("confidence_threshold {0} outside [0, 1]")]
    ThresholdOutOfRange(f32),

    #[error("features_per_frame must be 63 (with wrist) or 60 (without), got {0}")]
    UnsupportedFeatureCount(usize),

    #[error("at least one gesture class is required")]
    NoClasses,

    #[error("max_response_bytes must be greater than 0")]
    ZeroResponseCap,
}

/// Configuración completa del predictor. Todos los campos tienen valor por defecto,
/// así que un JSON parcial (o vacío) es válido.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub host: String,
    pub port: u16,
    pub sequence_length: usize,
    pub window_stride: usize,
    pub confidence_threshold: f32,
    /// 63 si se conserva la muñeca, 60 si se descarta
    pub features_per_frame: usize,
    /// Gestos entrenados, en el orden de los índices del modelo
    pub classes: Vec<String>,
    pub max_response_bytes: usize,
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
    pub startup_connect_attempts: u32,
    pub startup_retry_delay_ms: u64,
    /// Frames en cola entre captura y predicción
    pub frame_queue_capacity: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 65432,
            sequence_length: 20,
            window_stride: 5,
            confidence_threshold: 0.6,
            features_per_frame: 63,
            classes: DEFAULT_GESTURES.iter().map(|g| g.to_string()).collect(),
            max_response_bytes: 1024,
            connect_timeout_ms: 2000,
            io_timeout_ms: 1000,
            startup_connect_attempts: 10,
            startup_retry_delay_ms: 2000,
            frame_queue_capacity: 4,
        }
    }
}

impl PredictorConfig {
    /// Lee la configuración desde un JSON
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer la configuración {:?}", path))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Configuración inválida en {:?}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence_length == 0 {
            return Err(ConfigError::ZeroSequenceLength);
        }
        if self.window_stride == 0 {
            return Err(ConfigError::ZeroStride);
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.confidence_threshold));
        }
        if FeatureLayout::from_feature_count(self.features_per_frame).is_none() {
            return Err(ConfigError::UnsupportedFeatureCount(self.features_per_frame));
        }
        if self.classes.is_empty() {
            return Err(ConfigError::NoClasses);
        }
        if self.max_response_bytes == 0 {
            return Err(ConfigError::ZeroResponseCap);
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fija host y puerto desde `host:port`
    pub fn set_server_addr(&mut self, addr: &str) -> Result<()> {
        let (host, port) = addr
            .rsplit_once(':')
            .with_context(|| format!("Dirección sin puerto: {:?}", addr))?;
        self.port = port
            .parse()
            .with_context(|| format!("Puerto inválido en {:?}", addr))?;
        self.host = host.to_string();
        Ok(())
    }

    pub fn feature_layout(&self) -> Result<FeatureLayout, ConfigError> {
        FeatureLayout::from_feature_count(self.features_per_frame)
            .ok_or(ConfigError::UnsupportedFeatureCount(self.features_per_frame))
    }

    /// Número de floats por petición
    pub fn window_len(&self) -> usize {
        self.sequence_length * self.features_per_frame
    }

    /// Tabla de etiquetas: clases del modelo + entradas reservadas al final
    pub fn label_table(&self) -> Vec<String> {
        let mut labels = self.classes.clone();
        labels.push(LABEL_NOT_RECOGNIZED.to_string());
        labels.push(LABEL_NO_HAND.to_string());
        labels
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            addr: self.server_addr(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            max_response_bytes: self.max_response_bytes,
        }
    }

    pub fn startup_retry_delay(&self) -> Duration {
        Duration::from_millis(self.startup_retry_delay_ms)
    }
}

/// Carga la lista de gestos (un array JSON de strings).
/// Si el archivo falta o está corrupto se reescribe con los gestos por defecto.
pub fn load_gestures(path: impl AsRef<Path>) -> Vec<String> {
    let path = path.as_ref();
    let defaults: Vec<String> = DEFAULT_GESTURES.iter().map(|g| g.to_string()).collect();

    if !path.exists() {
        info!("No existe {:?}, se crea con los gestos por defecto", path);
        save_or_warn(path, &defaults);
        return defaults;
    }

    let parsed = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| serde_json::from_str::<Vec<String>>(&content).map_err(Into::into));

    match parsed {
        Ok(gestures) => gestures,
        Err(e) => {
            warn!("⚠️  Lista de gestos inválida en {:?} ({}), usando valores por defecto", path, e);
            save_or_warn(path, &defaults);
            defaults
        }
    }
}

/// Guarda la lista de gestos con indentación de 4 espacios
pub fn save_gestures(path: impl AsRef<Path>, gestures: &[String]) -> Result<()> {
    let path = path.as_ref();
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    gestures.serialize(&mut serializer)?;
    fs::write(path, out).with_context(|| format!("No se pudo escribir {:?}", path))?;
    Ok(())
}

fn save_or_warn(path: &Path, gestures: &[String]) {
    if let Err(e) = save_gestures(path, gestures) {
        warn!("{:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PredictorConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.server_addr(), "localhost:65432");
        assert_eq!(config.window_len(), 20 * 63);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"port": 9000, "features_per_frame": 60}"#).unwrap();

        let config = PredictorConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.features_per_frame, 60);
        assert_eq!(config.sequence_length, 20);
        assert_eq!(config.feature_layout(), Ok(FeatureLayout::WithoutOrigin));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PredictorConfig::default();
        config.features_per_frame = 18;
        assert_eq!(config.validate(), Err(ConfigError::UnsupportedFeatureCount(18)));

        let mut config = PredictorConfig::default();
        config.window_stride = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroStride));

        let mut config = PredictorConfig::default();
        config.confidence_threshold = 1.2;
        assert_eq!(config.validate(), Err(ConfigError::ThresholdOutOfRange(1.2)));

        let mut config = PredictorConfig::default();
        config.classes.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoClasses));
    }

    #[test]
    fn test_label_table_appends_reserved() {
        let table = PredictorConfig::default().label_table();
        assert_eq!(
            table,
            vec!["wave", "swipe_left", "swipe_right", LABEL_NOT_RECOGNIZED, LABEL_NO_HAND]
        );
    }

    #[test]
    fn test_set_server_addr() {
        let mut config = PredictorConfig::default();
        config.set_server_addr("10.0.0.2:7000").unwrap();
        assert_eq!(config.server_addr(), "10.0.0.2:7000");
        assert!(config.set_server_addr("sin-puerto").is_err());
    }

    #[test]
    fn test_load_gestures_fallback_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gestures.json");

        fs::write(&path, "{ no es json").unwrap();
        assert_eq!(load_gestures(&path), DEFAULT_GESTURES);

        // El archivo corrupto se reemplaza por los valores por defecto
        let saved: Vec<String> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, DEFAULT_GESTURES);

        fs::write(&path, r#"["fist", "palm"]"#).unwrap();
        assert_eq!(load_gestures(&path), vec!["fist", "palm"]);
    }

    #[test]
    fn test_load_gestures_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert_eq!(load_gestures(&path), DEFAULT_GESTURES);
        assert!(path.exists());
    }
}
