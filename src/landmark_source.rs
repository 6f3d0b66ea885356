use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord};

use crate::types::{RawLandmarkSet, FEATURES_WITH_ORIGIN};

/// Marca de frame sin mano
pub const NO_HAND_TOKEN: &str = "none";

/// Parsea una línea de texto: 63 floats separados por comas (x,y,z por landmark),
/// o `none` / línea vacía si no hay mano.
pub fn parse_line(line: &str) -> Result<Option<RawLandmarkSet>> {
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case(NO_HAND_TOKEN) {
        return Ok(None);
    }

    let values = line
        .split(',')
        .enumerate()
        .map(|(idx, field)| {
            field
                .trim()
                .parse::<f32>()
                .with_context(|| format!("valor {} inválido: {:?}", idx, field))
        })
        .collect::<Result<Vec<f32>>>()?;

    to_landmarks(&values).map(Some)
}

/// Carga todos los frames de un CSV con el mismo formato que `parse_line`,
/// una fila por frame de vídeo.
pub fn load_frames_from_csv(path: impl AsRef<Path>) -> Result<Vec<Option<RawLandmarkSet>>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut frames = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Fila {} inválida en {:?}", row_idx + 1, path))?;
        let frame = parse_record(&record)
            .with_context(|| format!("Fila {} de {:?}", row_idx + 1, path))?;
        frames.push(frame);
    }

    if frames.is_empty() {
        bail!("El CSV {:?} no contiene frames", path);
    }

    Ok(frames)
}

fn parse_record(record: &StringRecord) -> Result<Option<RawLandmarkSet>> {
    if record.len() == 1 && record[0].eq_ignore_ascii_case(NO_HAND_TOKEN) {
        return Ok(None);
    }

    let mut values = Vec::with_capacity(FEATURES_WITH_ORIGIN);
    for (idx, field) in record.iter().enumerate() {
        let value: f32 = field
            .parse()
            .with_context(|| format!("valor {} inválido: {:?}", idx, field))?;
        values.push(value);
    }

    to_landmarks(&values).map(Some)
}

fn to_landmarks(values: &[f32]) -> Result<RawLandmarkSet> {
    match RawLandmarkSet::from_flat(values) {
        Some(set) => Ok(set),
        None => bail!(
            "se esperaban {} valores (21 landmarks × 3), hay {}",
            FEATURES_WITH_ORIGIN,
            values.len()
        ),
    }
}
