use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use manoscopio::config::PredictorConfig;
use manoscopio::landmark_source::load_frames_from_csv;
use manoscopio::normalizer::normalize_set;
use manoscopio::predictor::GesturePredictor;
use manoscopio::types::RawLandmarkSet;
use manoscopio::wire::{encode_window, LEN_PREFIX_BYTES};

struct ReplayOptions {
    dump_features: bool,
    dump_request: bool,
    config_path: Option<PathBuf>,
    server: Option<String>,
}

const USAGE: &str = "Uso: replay_landmarks [--dump-features] [--dump-request] [--config config.json] [--server host:port] <frames.csv>";

fn parse_args() -> Result<(PathBuf, ReplayOptions)> {
    let mut opts = ReplayOptions {
        dump_features: false,
        dump_request: false,
        config_path: None,
        server: None,
    };
    let mut csv_path: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dump-features" => opts.dump_features = true,
            "--dump-request" => opts.dump_request = true,
            "--config" => {
                opts.config_path = Some(PathBuf::from(
                    args.next().ok_or_else(|| anyhow!("{}", USAGE))?,
                ))
            }
            "--server" => opts.server = Some(args.next().ok_or_else(|| anyhow!("{}", USAGE))?),
            _ => {
                if csv_path.is_some() {
                    bail!(USAGE);
                }
                csv_path = Some(PathBuf::from(arg));
            }
        }
    }

    let csv_path = csv_path.ok_or_else(|| anyhow!("Debes especificar un archivo CSV"))?;
    Ok((csv_path, opts))
}

fn main() -> Result<()> {
    manoscopio::init_logging();
    let (csv_path, opts) = parse_args()?;
    println!("🎞️  Reproduciendo landmarks desde {:?}", csv_path);

    let mut config = match &opts.config_path {
        Some(path) => PredictorConfig::from_file(path)?,
        None => PredictorConfig::default(),
    };
    if let Some(server) = &opts.server {
        config.set_server_addr(server)?;
    }

    let frames = load_frames_from_csv(&csv_path)?;
    let hands = frames.iter().filter(|f| f.is_some()).count();
    println!(
        "ℹ️  {} frames ({} con mano, {} sin mano)\n",
        frames.len(),
        hands,
        frames.len() - hands
    );

    let mut predictor = GesturePredictor::new(config)?;
    let mut last_hand: Option<RawLandmarkSet> = None;
    let mut last_request: Option<Vec<u8>> = None;

    for (idx, frame) in frames.iter().enumerate() {
        let result = predictor.predict(frame.as_ref());
        println!(
            "  {:>4}. {:<22} {:>6.2}%",
            idx + 1,
            result.label,
            result.confidence * 100.0
        );

        if frame.is_some() {
            last_hand = *frame;
        }
        if opts.dump_request && predictor.window().is_full() {
            last_request = Some(encode_window(
                predictor.window(),
                predictor.config().window_len(),
            )?);
        }
    }

    println!("\n📡 Peticiones enviadas: {}", predictor.requests_sent());

    if opts.dump_features {
        let hand = last_hand.ok_or_else(|| anyhow!("El CSV no contiene ningún frame con mano"))?;
        let layout = predictor.config().feature_layout()?;
        let features = normalize_set(&hand, layout);
        println!("\n📊 {} features del último frame con mano:", features.len());
        for (idx, value) in features.as_slice().iter().enumerate() {
            println!("  {:03}: {:>12.6}", idx, value);
        }
    }

    if opts.dump_request {
        match last_request {
            Some(bytes) => {
                let payload = bytes.len() - LEN_PREFIX_BYTES;
                println!(
                    "\n🧱 Última petición: prefijo {:02x?} + {} bytes de payload ({} floats)",
                    &bytes[..LEN_PREFIX_BYTES],
                    payload,
                    payload / 4
                );
            }
            None => println!("\n🧱 La ventana nunca llegó a llenarse, no hay petición"),
        }
    }

    predictor.cleanup();
    Ok(())
}
