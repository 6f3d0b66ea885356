/*
Reconocimiento de gestos de mano en tiempo real contra un servidor de inferencia TCP.

El tracker de landmarks (externo) escribe por stdin un frame por línea:
63 floats separados por comas (21 landmarks × x,y,z) o `none` si no hay mano.
Cada ventana de `sequence_length` frames se envía al servidor cada `window_stride` frames.

Uso:
    hand_tracker | ./target/release/manoscopio [--config config.json] [--gestures gestures.json] [--server host:port]

Logs con RUST_LOG=debug para ver cada frontera de stride.
*/

use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::RecvTimeoutError;
use tracing::{error, info, warn};

use manoscopio::config::{load_gestures, PredictorConfig};
use manoscopio::landmark_source::parse_line;
use manoscopio::predictor::GesturePredictor;
use manoscopio::worker::{FrameSender, PredictionWorker};

struct DaemonOptions {
    config_path: Option<PathBuf>,
    gestures_path: Option<PathBuf>,
    server: Option<String>,
}

fn parse_args() -> Result<DaemonOptions> {
    let mut opts = DaemonOptions {
        config_path: None,
        gestures_path: None,
        server: None,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = || {
            args.next()
                .ok_or_else(|| anyhow!("Falta el valor de {}", arg))
        };
        match arg.as_str() {
            "--config" => opts.config_path = Some(PathBuf::from(value()?)),
            "--gestures" => opts.gestures_path = Some(PathBuf::from(value()?)),
            "--server" => opts.server = Some(value()?),
            _ => bail!(
                "Uso: manoscopio [--config config.json] [--gestures gestures.json] [--server host:port]"
            ),
        }
    }

    Ok(opts)
}

fn load_config(opts: &DaemonOptions) -> Result<PredictorConfig> {
    let mut config = match &opts.config_path {
        Some(path) => PredictorConfig::from_file(path)?,
        None => PredictorConfig::default(),
    };

    if let Some(path) = &opts.gestures_path {
        config.classes = load_gestures(path);
    }
    if let Some(server) = &opts.server {
        config.set_server_addr(server)?;
    }

    config.validate()?;
    Ok(config)
}

/// Hilo de captura: lee stdin sin esperar nunca a la red
fn spawn_capture(frames: FrameSender) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("manoscopio-capture".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for (line_idx, line) in stdin.lock().lines().enumerate() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!("❌ Error leyendo stdin: {}", e);
                        break;
                    }
                };

                match parse_line(&line) {
                    Ok(frame) => {
                        frames.submit(frame);
                    }
                    Err(e) => warn!("Línea {} ignorada: {:#}", line_idx + 1, e),
                }
            }
            info!("Fin de la entrada de landmarks");
        })
        .context("No se pudo lanzar el hilo de captura")
}

fn main() -> Result<()> {
    manoscopio::init_logging();
    println!("🖐️  Gesture Recognition Client - Rust + TCP\n");

    let opts = parse_args()?;
    let config = load_config(&opts)?;
    let queue_capacity = config.frame_queue_capacity;

    println!("🎯 Servidor: {}", config.server_addr());
    println!("🏷️  Gestos: {:?}", config.classes);
    println!(
        "🪟 Ventana: {} frames × {} features, stride {}, umbral {:.2}\n",
        config.sequence_length,
        config.features_per_frame,
        config.window_stride,
        config.confidence_threshold
    );

    let mut predictor = GesturePredictor::new(config)?;

    // Conexión inicial acotada; si falla se reintenta en cada frontera de stride
    if let Err(e) = predictor.connect() {
        warn!("⚠️  {}, se seguirá intentando durante la captura", e);
    }

    let worker = PredictionWorker::spawn(predictor, queue_capacity)?;
    let capture = spawn_capture(worker.frame_sender())?;

    println!("🎬 Iniciando reconocimiento en tiempo real...\n");

    let mut last_label = String::new();
    loop {
        match worker.results().recv_timeout(Duration::from_millis(200)) {
            Ok(result) => {
                if result.label != last_label {
                    if result.is_status() {
                        println!("[ESTADO] {}", result.label);
                    } else {
                        println!(
                            "[GESTO] {} (conf: {:.2}%)",
                            result.label,
                            result.confidence * 100.0
                        );
                    }
                    last_label = result.label;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if capture.is_finished() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let dropped = worker.dropped_frames();
    worker.stop();
    if dropped > 0 {
        println!("ℹ️  Frames descartados por saturación: {}", dropped);
    }

    println!("\n👋 Saliendo...");
    Ok(())
}
