//! Protocolo con el servidor de inferencia.
//!
//! Petición: `u32` big-endian con la longitud del payload, seguido de `L` floats
//! IEEE-754 big-endian (frame más antiguo primero).
//! Respuesta: una línea de texto `"<class_index>,<confidence>"`.

use thiserror::Error;

use crate::sequence_window::SequenceWindow;

/// Bytes del prefijo de longitud
pub const LEN_PREFIX_BYTES: usize = 4;
const FLOAT_BYTES: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireError {
    #[error("Invalid window size: expected {expected} floats, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Class index {index} out of range (known classes: {known})")]
    IndexOutOfRange { index: usize, known: usize },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}

/// Serializa una ventana llena. `expected_len` = sequence_length × features_per_frame.
pub fn encode_window(window: &SequenceWindow, expected_len: usize) -> Result<Vec<u8>, WireError> {
    encode_floats(&window.flatten(), expected_len)
}

/// Serializa una secuencia de floats ya aplanada
pub fn encode_floats(values: &[f32], expected_len: usize) -> Result<Vec<u8>, WireError> {
    if values.len() != expected_len {
        return Err(WireError::SizeMismatch {
            expected: expected_len,
            actual: values.len(),
        });
    }

    let payload_len = values.len() * FLOAT_BYTES;
    let prefix = u32::try_from(payload_len).map_err(|_| WireError::SizeMismatch {
        expected: u32::MAX as usize / FLOAT_BYTES,
        actual: values.len(),
    })?;

    let mut bytes = Vec::with_capacity(LEN_PREFIX_BYTES + payload_len);
    bytes.extend_from_slice(&prefix.to_be_bytes());
    for value in values {
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    Ok(bytes)
}

/// Decodifica la respuesta del servidor. `known_classes` es el tamaño de la
/// tabla de etiquetas; cualquier índice fuera de ella es un error.
pub fn decode_response(bytes: &[u8], known_classes: usize) -> Result<(usize, f32), WireError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| WireError::MalformedResponse(format!("not UTF-8: {}", e)))?
        .trim();

    if text.is_empty() {
        return Err(WireError::MalformedResponse("empty response".to_string()));
    }

    let (index_str, confidence_str) = text
        .split_once(',')
        .ok_or_else(|| WireError::MalformedResponse(format!("missing comma in {:?}", text)))?;

    let index: usize = index_str
        .trim()
        .parse()
        .map_err(|_| WireError::MalformedResponse(format!("bad class index {:?}", index_str)))?;

    let confidence: f32 = confidence_str.trim().parse().map_err(|_| {
        WireError::MalformedResponse(format!("bad confidence {:?}", confidence_str))
    })?;

    if !(0.0..=1.0).contains(&confidence) {
        return Err(WireError::MalformedResponse(format!(
            "confidence {} outside [0, 1]",
            confidence
        )));
    }

    if index >= known_classes {
        return Err(WireError::IndexOutOfRange {
            index,
            known: known_classes,
        });
    }

    Ok((index, confidence))
}

/// Lado servidor del protocolo: recupera los floats de una petición completa
pub fn decode_request(bytes: &[u8]) -> Result<Vec<f32>, WireError> {
    if bytes.len() < LEN_PREFIX_BYTES {
        return Err(WireError::MalformedRequest(format!(
            "{} bytes, shorter than the length prefix",
            bytes.len()
        )));
    }

    let (prefix, payload) = bytes.split_at(LEN_PREFIX_BYTES);
    let declared = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

    if declared != payload.len() || declared % FLOAT_BYTES != 0 {
        return Err(WireError::MalformedRequest(format!(
            "length prefix {} does not match payload of {} bytes",
            declared,
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(FLOAT_BYTES)
        .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Formatea una respuesta como la escribe el servidor
pub fn encode_response(class_index: usize, confidence: f32) -> String {
    format!("{},{}", class_index, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NormalizedFrame;

    #[test]
    fn test_encode_layout() {
        let bytes = encode_floats(&[1.0, -2.5], 2).unwrap();
        assert_eq!(bytes.len(), 4 + 8);
        assert_eq!(&bytes[..4], &8u32.to_be_bytes());
        assert_eq!(&bytes[4..8], &1.0f32.to_be_bytes());
        assert_eq!(&bytes[8..], &(-2.5f32).to_be_bytes());
    }

    #[test]
    fn test_encode_size_mismatch() {
        let err = encode_floats(&[0.0; 5], 6).unwrap_err();
        assert_eq!(
            err,
            WireError::SizeMismatch {
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn test_window_round_trip() {
        let mut window = SequenceWindow::new(20, 63);
        for i in 0..23 {
            let values = (0..63).map(|j| i as f32 * 0.01 + j as f32 * 0.001).collect();
            window.push(&NormalizedFrame::new(values));
        }

        let expected = window.flatten();
        let bytes = encode_window(&window, 20 * 63).unwrap();
        assert_eq!(&bytes[..4], &((4 * 20 * 63) as u32).to_be_bytes());

        let decoded = decode_request(&bytes).unwrap();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_decode_response_ok() {
        assert_eq!(decode_response(b"2,0.875", 5).unwrap(), (2, 0.875));
        assert_eq!(decode_response(b"0,1\n", 5).unwrap(), (0, 1.0));

        let reply = encode_response(3, 0.625);
        assert_eq!(reply, "3,0.625");
        assert_eq!(decode_response(reply.as_bytes(), 5).unwrap(), (3, 0.625));
    }

    #[test]
    fn test_decode_response_malformed() {
        for bad in ["", "   ", "2;0.5", "x,0.5", "2,abc", "-1,0.5", "1,1.5", "1,NaN"] {
            assert!(
                matches!(
                    decode_response(bad.as_bytes(), 5),
                    Err(WireError::MalformedResponse(_))
                ),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_decode_response_index_out_of_range() {
        assert_eq!(
            decode_response(b"5,0.9", 5).unwrap_err(),
            WireError::IndexOutOfRange { index: 5, known: 5 }
        );
    }

    #[test]
    fn test_decode_request_rejects_bad_prefix() {
        let mut bytes = encode_floats(&[1.0, 2.0], 2).unwrap();
        bytes.pop();
        assert!(matches!(
            decode_request(&bytes),
            Err(WireError::MalformedRequest(_))
        ));
        assert!(decode_request(&[0, 0]).is_err());
    }
}
