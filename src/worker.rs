use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::connection::AbortHandle;
use crate::predictor::GesturePredictor;
use crate::types::{PredictionResult, RawLandmarkSet};

/// Resultados pendientes antes de empezar a descartarlos
const RESULT_QUEUE: usize = 64;

/// Lo que se descartó entre el último frame entregado y el siguiente.
/// `HandLost` domina sobre `FramesDropped`: ambos reinician la ventana.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Discontinuity {
    Contiguous = 0,
    FramesDropped = 1,
    HandLost = 2,
}

impl Discontinuity {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Discontinuity::Contiguous,
            1 => Discontinuity::FramesDropped,
            _ => Discontinuity::HandLost,
        }
    }
}

/// Frame en la cola junto con lo que se perdió justo antes de él
#[derive(Debug)]
struct Submission {
    discontinuity: Discontinuity,
    frame: Option<RawLandmarkSet>,
}

/// Extremo de captura. Nunca bloquea: si la cola está llena el frame se descarta,
/// pero la pérdida queda anotada y viaja con el siguiente frame que entre.
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<Submission>,
    dropped: Arc<AtomicU64>,
    pending: Arc<AtomicU8>,
}

impl FrameSender {
    fn new(tx: Sender<Submission>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(AtomicU8::new(Discontinuity::Contiguous as u8)),
        }
    }

    /// Entrega un frame al worker. Devuelve `false` si se descartó.
    pub fn submit(&self, frame: Option<RawLandmarkSet>) -> bool {
        let lost = match frame {
            Some(_) => Discontinuity::FramesDropped,
            None => Discontinuity::HandLost,
        };
        let pending = Discontinuity::from_u8(
            self.pending
                .swap(Discontinuity::Contiguous as u8, Ordering::AcqRel),
        );

        match self.tx.try_send(Submission {
            discontinuity: pending,
            frame,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.pending
                    .fetch_max(pending.max(lost) as u8, Ordering::AcqRel);
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 100 == 1 {
                    warn!("⚠️  Predictor saturado, {} frames descartados", dropped);
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Pérdida anotada que aún no ha llegado al worker
    #[cfg(test)]
    fn pending_discontinuity(&self) -> Discontinuity {
        Discontinuity::from_u8(self.pending.load(Ordering::Acquire))
    }
}

/// Hilo dedicado de predicción: separa la red (bloqueante) de la captura y la UI
pub struct PredictionWorker {
    frames: FrameSender,
    results_rx: Receiver<PredictionResult>,
    latest: Arc<Mutex<PredictionResult>>,
    stop_tx: Sender<()>,
    abort: AbortHandle,
    thread: Option<JoinHandle<()>>,
}

impl PredictionWorker {
    /// Lanza el hilo; el predictor pasa a ser propiedad exclusiva del worker
    pub fn spawn(mut predictor: GesturePredictor, queue_capacity: usize) -> Result<Self> {
        let (frames_tx, frames_rx) = bounded::<Submission>(queue_capacity.max(1));
        let (results_tx, results_rx) = bounded::<PredictionResult>(RESULT_QUEUE);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let latest = Arc::new(Mutex::new(PredictionResult::default()));
        let latest_worker = Arc::clone(&latest);
        let abort = predictor.abort_handle();

        let thread = thread::Builder::new()
            .name("manoscopio-predictor".to_string())
            .spawn(move || {
                let mut processed = 0u64;
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(frames_rx) -> msg => {
                            let Ok(Submission { discontinuity, frame }) = msg else { break };

                            // Un frame sin mano ya vacía la ventana por sí mismo
                            if frame.is_some() {
                                match discontinuity {
                                    Discontinuity::HandLost => {
                                        debug!("ausencia de mano descartada en la cola, se aplica ahora");
                                        let result = predictor.predict(None);
                                        publish(&latest_worker, &results_tx, result);
                                    }
                                    Discontinuity::FramesDropped => predictor.reset_window(),
                                    Discontinuity::Contiguous => {}
                                }
                            }

                            let result = predictor.predict(frame.as_ref());
                            processed += 1;
                            publish(&latest_worker, &results_tx, result);
                        }
                    }
                }

                predictor.cleanup();
                debug!("worker de predicción terminado tras {} frames", processed);
            })
            .context("No se pudo lanzar el hilo de predicción")?;

        info!("🧵 Worker de predicción iniciado");

        Ok(Self {
            frames: FrameSender::new(frames_tx),
            results_rx,
            latest,
            stop_tx,
            abort,
            thread: Some(thread),
        })
    }

    /// Extremo para el hilo de captura
    pub fn frame_sender(&self) -> FrameSender {
        self.frames.clone()
    }

    pub fn submit(&self, frame: Option<RawLandmarkSet>) -> bool {
        self.frames.submit(frame)
    }

    /// Resultados en orden de llegada de los frames
    pub fn results(&self) -> &Receiver<PredictionResult> {
        &self.results_rx
    }

    /// Último resultado publicado
    pub fn latest(&self) -> PredictionResult {
        lock(&self.latest).clone()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.frames.dropped.load(Ordering::Relaxed)
    }

    /// Detiene el worker. Una petición en curso se abandona cerrando el socket.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        let _ = self.stop_tx.try_send(());
        self.abort.abort();

        if thread.join().is_err() {
            warn!("El hilo de predicción terminó con pánico");
        }
        info!("🛑 Worker de predicción detenido");
    }
}

impl Drop for PredictionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn publish(
    latest: &Mutex<PredictionResult>,
    results_tx: &Sender<PredictionResult>,
    result: PredictionResult,
) {
    *lock(latest) = result.clone();
    // Si el consumidor no lee, le queda la instantánea en `latest`
    let _ = results_tx.try_send(result);
}

fn lock(value: &Mutex<PredictionResult>) -> MutexGuard<'_, PredictionResult> {
    match value.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PredictorConfig;
    use crate::types::{LABEL_COLLECTING, LABEL_NO_HAND, NUM_LANDMARKS};
    use std::net::TcpListener;
    use std::time::Duration;

    fn offline_predictor() -> GesturePredictor {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = PredictorConfig::default();
        config.host = "127.0.0.1".to_string();
        config.port = listener.local_addr().unwrap().port();
        config.sequence_length = 3;
        config.window_stride = 1;
        GesturePredictor::new(config).unwrap()
    }

    fn hand() -> RawLandmarkSet {
        let mut points = [[0.0f32; 3]; NUM_LANDMARKS];
        for (i, p) in points.iter_mut().enumerate() {
            *p = [i as f32 * 0.01, 0.2, 0.0];
        }
        RawLandmarkSet::new(points)
    }

    #[test]
    fn test_results_follow_frame_order() {
        let worker = PredictionWorker::spawn(offline_predictor(), 16).unwrap();

        assert!(worker.submit(None));
        assert!(worker.submit(Some(hand())));

        let timeout = Duration::from_secs(2);
        let first = worker.results().recv_timeout(timeout).unwrap();
        let second = worker.results().recv_timeout(timeout).unwrap();

        assert_eq!(first.label, LABEL_NO_HAND);
        assert_eq!(second.label, LABEL_COLLECTING);
        assert_eq!(worker.latest().label, LABEL_COLLECTING);
        worker.stop();
    }

    #[test]
    fn test_submit_after_stop_is_rejected() {
        let worker = PredictionWorker::spawn(offline_predictor(), 1).unwrap();
        let sender = worker.frame_sender();
        worker.stop();

        assert!(!sender.submit(None));
    }

    #[test]
    fn test_dropped_absence_travels_with_next_frame() {
        let (tx, rx) = bounded::<Submission>(1);
        let sender = FrameSender::new(tx);

        assert!(sender.submit(Some(hand())));
        assert!(!sender.submit(None));
        assert_eq!(sender.pending_discontinuity(), Discontinuity::HandLost);

        // Otra mano descartada no rebaja la pérdida anotada
        assert!(!sender.submit(Some(hand())));
        assert_eq!(sender.pending_discontinuity(), Discontinuity::HandLost);
        assert_eq!(rx.recv().unwrap().discontinuity, Discontinuity::Contiguous);

        assert!(sender.submit(Some(hand())));
        let next = rx.recv().unwrap();
        assert_eq!(next.discontinuity, Discontinuity::HandLost);
        assert!(next.frame.is_some());
        assert_eq!(sender.pending_discontinuity(), Discontinuity::Contiguous);
    }

    #[test]
    fn test_dropped_hands_mark_a_gap() {
        let (tx, rx) = bounded::<Submission>(1);
        let sender = FrameSender::new(tx);

        assert!(sender.submit(Some(hand())));
        assert!(!sender.submit(Some(hand())));
        assert_eq!(sender.pending_discontinuity(), Discontinuity::FramesDropped);

        rx.recv().unwrap();
        assert!(sender.submit(Some(hand())));
        assert_eq!(
            rx.recv().unwrap().discontinuity,
            Discontinuity::FramesDropped
        );
    }
}
