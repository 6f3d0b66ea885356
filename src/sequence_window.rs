use crate::types::NormalizedFrame;

/// Buffer circular de frames normalizados con contador de stride.
/// La memoria se reserva una sola vez: `capacity * features_per_frame` floats.
pub struct SequenceWindow {
    data: Vec<f32>,
    capacity: usize,
    features_per_frame: usize,
    /// Siguiente posición de escritura
    write_index: usize,
    len: usize,
    /// Frames vistos desde la última vez que desapareció la mano
    frame_count: u64,
}

impl SequenceWindow {
    /// Crea una ventana vacía para `capacity` frames de `features_per_frame` floats
    pub fn new(capacity: usize, features_per_frame: usize) -> Self {
        assert!(capacity > 0, "la ventana necesita al menos un frame");
        Self {
            data: vec![0.0; capacity * features_per_frame],
            capacity,
            features_per_frame,
            write_index: 0,
            len: 0,
            frame_count: 0,
        }
    }

    /// Añade un frame; si la ventana está llena descarta el más antiguo.
    /// También avanza el contador de stride.
    pub fn push(&mut self, frame: &NormalizedFrame) {
        assert_eq!(
            frame.len(),
            self.features_per_frame,
            "frame con {} features en una ventana de {}",
            frame.len(),
            self.features_per_frame
        );

        let start = self.write_index * self.features_per_frame;
        self.data[start..start + self.features_per_frame].copy_from_slice(frame.as_slice());
        self.write_index = (self.write_index + 1) % self.capacity;

        if self.len < self.capacity {
            self.len += 1;
        }
        self.frame_count += 1;
    }

    /// Vacía la ventana y reinicia el contador de stride
    pub fn clear(&mut self) {
        self.write_index = 0;
        self.len = 0;
        self.frame_count = 0;
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn features_per_frame(&self) -> usize {
        self.features_per_frame
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// `true` si este frame toca petición: ventana llena y
    /// `(count - capacity) % stride == 0`
    pub fn at_stride_boundary(&self, stride: usize) -> bool {
        if !self.is_full() || stride == 0 {
            return false;
        }
        let since_full = self.frame_count - self.capacity as u64;
        since_full % stride as u64 == 0
    }

    /// Concatena los frames en orden de llegada, del más antiguo al más reciente.
    /// Llamarla con la ventana incompleta es un error de programación.
    pub fn flatten(&self) -> Vec<f32> {
        assert!(
            self.is_full(),
            "flatten() con {}/{} frames",
            self.len,
            self.capacity
        );

        // Con la ventana llena, write_index apunta al frame más antiguo
        let split = self.write_index * self.features_per_frame;
        let mut flat = Vec::with_capacity(self.data.len());
        flat.extend_from_slice(&self.data[split..]);
        flat.extend_from_slice(&self.data[..split]);
        flat
    }
}
