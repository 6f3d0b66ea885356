use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, PredictorConfig};
use crate::connection::{AbortHandle, ConnectionError, ConnectionManager, ConnectionState};
use crate::normalizer::{normalize_set, FeatureLayout};
use crate::sequence_window::SequenceWindow;
use crate::types::{
    PredictionResult, RawLandmarkSet, LABEL_COLLECTING, LABEL_CONNECTING, LABEL_DATA_ERROR,
    LABEL_ERROR, LABEL_NOT_RECOGNIZED, LABEL_NO_HAND,
};
use crate::wire::{self, WireError};

#[derive(Error, Debug)]
pub enum PredictError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Wire(#[from] WireError),
}

impl PredictError {
    /// Estado que ve el consumidor para este fallo
    pub fn status_label(&self) -> &'static str {
        match self {
            PredictError::Connection(_) => LABEL_CONNECTING,
            PredictError::Wire(WireError::SizeMismatch { .. }) => LABEL_DATA_ERROR,
            PredictError::Wire(_) => LABEL_ERROR,
        }
    }
}

/// Orquestador por frame: normaliza, acumula la ventana y, en cada frontera
/// de stride, pide una predicción al servidor.
pub struct GesturePredictor {
    config: PredictorConfig,
    layout: FeatureLayout,
    labels: Vec<String>,
    window: SequenceWindow,
    connection: ConnectionManager,
    /// Último resultado de una frontera de stride; se repite entre peticiones
    last_result: PredictionResult,
    requests: u64,
    /// Fronteras seguidas que terminaron en fallo; solo la primera se avisa con `warn!`
    consecutive_failures: u32,
}

impl GesturePredictor {
    pub fn new(config: PredictorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let layout = config.feature_layout()?;

        Ok(Self {
            layout,
            labels: config.label_table(),
            window: SequenceWindow::new(config.sequence_length, config.features_per_frame),
            connection: ConnectionManager::new(config.connection_settings()),
            last_result: PredictionResult::default(),
            requests: 0,
            consecutive_failures: 0,
            config,
        })
    }

    /// Procesa los landmarks de un frame (o su ausencia) y devuelve (etiqueta, confianza).
    /// Nunca falla: los errores se convierten en etiquetas de estado.
    pub fn predict(&mut self, landmarks: Option<&RawLandmarkSet>) -> PredictionResult {
        let Some(landmarks) = landmarks else {
            self.window.clear();
            self.last_result = PredictionResult::status(LABEL_NO_HAND);
            return self.last_result.clone();
        };

        let frame = normalize_set(landmarks, self.layout);
        self.window.push(&frame);

        if !self.window.is_full() {
            return PredictionResult::status(LABEL_COLLECTING);
        }

        if !self.window.at_stride_boundary(self.config.window_stride) {
            return self.last_result.clone();
        }

        debug!(
            "frontera de stride en el frame {}, pidiendo predicción",
            self.window.frame_count()
        );

        self.last_result = match self.request_prediction() {
            Ok((index, confidence)) => {
                if self.consecutive_failures > 0 {
                    info!(
                        "✅ Predicciones recuperadas tras {} fallos",
                        self.consecutive_failures
                    );
                    self.consecutive_failures = 0;
                }
                self.apply_confidence_gate(index, confidence)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures == 1 {
                    warn!("Predicción fallida ({}): {}", self.connection.addr(), e);
                } else {
                    debug!(
                        "Predicción fallida ({} seguidas): {}",
                        self.consecutive_failures, e
                    );
                }
                PredictionResult::status(e.status_label())
            }
        };
        self.last_result.clone()
    }

    /// Descarta la ventana sin tocar el último resultado. Se usa cuando se
    /// perdieron frames y los siguientes ya no son contiguos a los guardados.
    pub fn reset_window(&mut self) {
        if !self.window.is_empty() {
            debug!(
                "ventana reiniciada con {} frames acumulados",
                self.window.len()
            );
        }
        self.window.clear();
    }

    /// Codifica la ventana actual, la envía y decodifica la respuesta
    fn request_prediction(&mut self) -> Result<(usize, f32), PredictError> {
        let request = wire::encode_window(&self.window, self.config.window_len())?;
        self.requests += 1;
        let response = self.connection.request(&request)?;
        Ok(wire::decode_response(&response, self.labels.len())?)
    }

    /// Umbral inclusivo: `confidence >= threshold` pasa
    pub fn apply_confidence_gate(&self, index: usize, confidence: f32) -> PredictionResult {
        if confidence >= self.config.confidence_threshold {
            match self.labels.get(index) {
                Some(label) => PredictionResult::new(label.clone(), confidence),
                None => PredictionResult::status(LABEL_ERROR),
            }
        } else {
            PredictionResult::new(LABEL_NOT_RECOGNIZED, confidence)
        }
    }

    /// Conexión inicial con reintentos acotados según la configuración
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        self.connection.connect_with_retry(
            self.config.startup_connect_attempts,
            self.config.startup_retry_delay(),
        )
    }

    /// Cierra la conexión y vacía el estado interno
    pub fn cleanup(&mut self) {
        self.connection.close();
        self.window.clear();
        self.last_result = PredictionResult::default();
        self.consecutive_failures = 0;
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.connection.abort_handle()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn window(&self) -> &SequenceWindow {
        &self.window
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Peticiones enviadas al servidor desde la creación
    pub fn requests_sent(&self) -> u64 {
        self.requests
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
