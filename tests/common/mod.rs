//! Servidor de inferencia de prueba que habla el protocolo real sobre loopback.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use manoscopio::config::PredictorConfig;
use manoscopio::types::{RawLandmarkSet, NUM_LANDMARKS};
use manoscopio::wire::decode_request;

/// Respuesta para la petición número `n` (desde 0). `None` cierra la conexión sin responder.
pub type Responder = dyn Fn(usize, &[f32]) -> Option<String> + Send + Sync;

pub struct MockServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Vec<f32>>>>,
    accepted: Arc<AtomicUsize>,
}

impl MockServer {
    pub fn start<F>(respond: F) -> Self
    where
        F: Fn(usize, &[f32]) -> Option<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let respond: Arc<Responder> = Arc::new(respond);

        let requests_server = Arc::clone(&requests);
        let accepted_server = Arc::clone(&accepted);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                accepted_server.fetch_add(1, Ordering::SeqCst);
                serve(stream, &requests_server, respond.as_ref());
            }
        });

        Self {
            addr,
            requests,
            accepted,
        }
    }

    pub fn requests(&self) -> Vec<Vec<f32>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Espera hasta que el servidor haya recibido `count` peticiones
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.request_count() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Configuración apuntando a este servidor
    pub fn config(&self, sequence_length: usize, stride: usize) -> PredictorConfig {
        let mut config = PredictorConfig::default();
        config.host = self.addr.ip().to_string();
        config.port = self.addr.port();
        config.sequence_length = sequence_length;
        config.window_stride = stride;
        config.io_timeout_ms = 5000;
        config
    }
}

fn serve(mut stream: TcpStream, requests: &Mutex<Vec<Vec<f32>>>, respond: &Responder) {
    loop {
        let mut prefix = [0u8; 4];
        if stream.read_exact(&mut prefix).is_err() {
            return;
        }
        let mut frame = prefix.to_vec();
        frame.resize(4 + u32::from_be_bytes(prefix) as usize, 0);
        if stream.read_exact(&mut frame[4..]).is_err() {
            return;
        }

        let floats = decode_request(&frame).unwrap();
        let n = {
            let mut requests = requests.lock().unwrap();
            requests.push(floats.clone());
            requests.len() - 1
        };

        match respond(n, &floats) {
            Some(text) => {
                if stream.write_all(text.as_bytes()).is_err() {
                    return;
                }
            }
            None => return,
        }
    }
}

/// Mano sintética con los landmarks desplegados en abanico
pub fn hand(offset: f32) -> RawLandmarkSet {
    let mut points = [[0.0f32; 3]; NUM_LANDMARKS];
    for (i, p) in points.iter_mut().enumerate() {
        let angle = i as f32 * 0.3;
        *p = [
            offset + 0.1 * angle.cos() * (1.0 + i as f32 * 0.05),
            offset + 0.1 * angle.sin() * (1.0 + i as f32 * 0.05),
            i as f32 * 0.001,
        ];
    }
    points[0] = [offset, offset, 0.0];
    RawLandmarkSet::new(points)
}
