/// Un landmark 3D en coordenadas normalizadas de imagen: (x, y, z)
pub type Landmark = [f32; 3];

/// Constantes del sistema
pub const NUM_LANDMARKS: usize = 21;
pub const NUM_AXES: usize = 3; // x, y, z
pub const WRIST: usize = 0; // Landmark usado como origen
pub const FEATURES_WITH_ORIGIN: usize = NUM_LANDMARKS * NUM_AXES; // 63
pub const FEATURES_WITHOUT_ORIGIN: usize = (NUM_LANDMARKS - 1) * NUM_AXES; // 60

/// Etiquetas de estado que el predictor devuelve en lugar de una clase
pub const LABEL_NO_HAND: &str = "No Hand Present";
pub const LABEL_COLLECTING: &str = "Collecting data...";
pub const LABEL_CONNECTING: &str = "Connecting...";
pub const LABEL_ERROR: &str = "Error";
pub const LABEL_DATA_ERROR: &str = "Data Error";
pub const LABEL_NOT_RECOGNIZED: &str = "Not Recognized";

/// Los 21 landmarks de una mano detectada en un frame de vídeo.
/// Es efímero: sólo vive hasta que se normaliza.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawLandmarkSet {
    pub points: [Landmark; NUM_LANDMARKS],
}

impl RawLandmarkSet {
    pub fn new(points: [Landmark; NUM_LANDMARKS]) -> Self {
        Self { points }
    }

    /// Construye el conjunto desde 63 floats en orden landmark → eje
    pub fn from_flat(values: &[f32]) -> Option<Self> {
        if values.len() != FEATURES_WITH_ORIGIN {
            return None;
        }

        let mut points = [[0.0f32; NUM_AXES]; NUM_LANDMARKS];
        for (i, point) in points.iter_mut().enumerate() {
            point.copy_from_slice(&values[i * NUM_AXES..(i + 1) * NUM_AXES]);
        }
        Some(Self { points })
    }

    /// Aplica `s·p + t` a todos los puntos
    pub fn scaled_translated(&self, scale: f32, offset: Landmark) -> Self {
        let mut points = self.points;
        for p in points.iter_mut() {
            for axis in 0..NUM_AXES {
                p[axis] = p[axis] * scale + offset[axis];
            }
        }
        Self { points }
    }
}

/// Pose de una mano invariante a posición y escala, ya aplanada
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFrame {
    values: Vec<f32>,
}

impl NormalizedFrame {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Norma euclídea del vector completo
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

/// Resultado que recibe el consumidor (GUI, consola) en cada frame
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: String,
    pub confidence: f32,
}

impl PredictionResult {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Resultado de estado, siempre con confianza 0
    pub fn status(label: &str) -> Self {
        Self::new(label, 0.0)
    }

    /// Indica si la etiqueta es un estado y no una clase del modelo
    pub fn is_status(&self) -> bool {
        matches!(
            self.label.as_str(),
            LABEL_NO_HAND | LABEL_COLLECTING | LABEL_CONNECTING | LABEL_ERROR | LABEL_DATA_ERROR
        )
    }
}

impl Default for PredictionResult {
    fn default() -> Self {
        Self::status(LABEL_NO_HAND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flat_requires_63_values() {
        assert!(RawLandmarkSet::from_flat(&[0.0; 60]).is_none());

        let values: Vec<f32> = (0..63).map(|v| v as f32).collect();
        let set = RawLandmarkSet::from_flat(&values).unwrap();
        assert_eq!(set.points[0], [0.0, 1.0, 2.0]);
        assert_eq!(set.points[20], [60.0, 61.0, 62.0]);
    }

    #[test]
    fn test_status_labels() {
        assert!(PredictionResult::status(LABEL_CONNECTING).is_status());
        assert!(!PredictionResult::new("wave", 0.9).is_status());
        assert!(!PredictionResult::status(LABEL_NOT_RECOGNIZED).is_status());
    }
}
