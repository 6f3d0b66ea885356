use crate::types::{
    NormalizedFrame, RawLandmarkSet, FEATURES_WITHOUT_ORIGIN, FEATURES_WITH_ORIGIN, NUM_AXES,
    NUM_LANDMARKS, WRIST,
};

/// Por debajo de esta escala la mano se considera degenerada
const MIN_SCALE: f32 = 1e-6;

/// Qué landmarks entran en el vector de características.
/// Debe coincidir con lo que espera el servidor de inferencia.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureLayout {
    /// 21 landmarks, los tres primeros valores siempre (0, 0, 0)
    WithOrigin,
    /// 20 landmarks, se descarta la muñeca
    WithoutOrigin,
}

impl FeatureLayout {
    /// Deduce el layout a partir de `features_per_frame` (63 o 60)
    pub fn from_feature_count(count: usize) -> Option<Self> {
        match count {
            FEATURES_WITH_ORIGIN => Some(Self::WithOrigin),
            FEATURES_WITHOUT_ORIGIN => Some(Self::WithoutOrigin),
            _ => None,
        }
    }

    pub fn features_per_frame(self) -> usize {
        match self {
            Self::WithOrigin => FEATURES_WITH_ORIGIN,
            Self::WithoutOrigin => FEATURES_WITHOUT_ORIGIN,
        }
    }
}

/// Normaliza un conjunto de landmarks: origen en la muñeca y escala igual a la
/// distancia media al origen. Ausente in ⇒ ausente out.
pub fn normalize(landmarks: Option<&RawLandmarkSet>, layout: FeatureLayout) -> Option<NormalizedFrame> {
    landmarks.map(|set| normalize_set(set, layout))
}

/// Normalización de una mano presente. Invariante a traslación y escala
/// uniforme, no a rotación.
pub fn normalize_set(landmarks: &RawLandmarkSet, layout: FeatureLayout) -> NormalizedFrame {
    let origin = landmarks.points[WRIST];

    // 1. Coordenadas relativas a la muñeca
    let mut relative = [[0.0f32; NUM_AXES]; NUM_LANDMARKS];
    for (rel, point) in relative.iter_mut().zip(landmarks.points.iter()) {
        for axis in 0..NUM_AXES {
            rel[axis] = point[axis] - origin[axis];
        }
    }

    // 2. Escala = media de las normas (el origen aporta 0)
    let total: f32 = relative
        .iter()
        .map(|p| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt())
        .sum();
    let mut scale = total / NUM_LANDMARKS as f32;

    // 3. Mano degenerada: todos los puntos sobre el origen
    if scale < MIN_SCALE {
        scale = 1.0;
    }

    // 4-5. Dividir y aplanar en orden landmark → eje
    let skip = match layout {
        FeatureLayout::WithOrigin => 0,
        FeatureLayout::WithoutOrigin => 1,
    };

    let mut values = Vec::with_capacity(layout.features_per_frame());
    for rel in relative.iter().skip(skip) {
        values.extend(rel.iter().map(|v| v / scale));
    }

    NormalizedFrame::new(values)
}
