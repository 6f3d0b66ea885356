use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Connection to {addr} refused: {source}")]
    Refused {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection lost: {0}")]
    Lost(#[source] io::Error),

    #[error("Connection closed")]
    Closed,
}

/// Estado de la conexión con el servidor de inferencia
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// El último intercambio falló; hay que reconectar antes de volver a enviar
    Faulted,
}

/// Eventos que mueven la máquina de estados
enum Event {
    ConnectSucceeded(TcpStream),
    ConnectFailed,
    IoFailed,
    Closed,
}

/// Parámetros de red del cliente
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// `host:port`
    pub addr: String,
    pub connect_timeout: Duration,
    /// Límite para cada escritura/lectura; un servidor colgado cuenta como fallo
    pub io_timeout: Duration,
    /// Bytes máximos leídos por respuesta
    pub max_response_bytes: usize,
}

/// Permite cerrar el socket desde otro hilo y abandonar una petición en curso
#[derive(Clone)]
pub struct AbortHandle {
    inner: Arc<AbortInner>,
}

struct AbortInner {
    aborted: AtomicBool,
    stream: Mutex<Option<TcpStream>>,
}

impl AbortHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(AbortInner {
                aborted: AtomicBool::new(false),
                stream: Mutex::new(None),
            }),
        }
    }

    /// Marca la conexión como abortada y cierra el socket activo.
    /// Cualquier `request` bloqueado vuelve con `ConnectionError::Closed`.
    pub fn abort(&self) {
        self.inner.aborted.store(true, Ordering::SeqCst);
        if let Some(stream) = self.lock_stream().take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("shutdown del socket al abortar: {}", e);
            }
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    fn register(&self, stream: Option<TcpStream>) {
        *self.lock_stream() = stream;
        // abort() pudo llegar mientras conectábamos
        if self.is_aborted() {
            if let Some(stream) = self.lock_stream().take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<TcpStream>> {
        match self.inner.stream.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Conexión TCP persistente con el servidor de inferencia.
/// Expone una única llamada bloqueante petición/respuesta.
pub struct ConnectionManager {
    settings: ConnectionSettings,
    state: ConnectionState,
    stream: Option<TcpStream>,
    abort: AbortHandle,
    reconnects: u64,
}

impl ConnectionManager {
    /// No conecta todavía: la primera petición (o `connect`) abre el socket
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            state: ConnectionState::Disconnected,
            stream: None,
            abort: AbortHandle::new(),
            reconnects: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn addr(&self) -> &str {
        &self.settings.addr
    }

    /// Reconexiones hechas tras perder una conexión establecida
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Única función que cambia el estado
    fn transition(&mut self, event: Event) {
        let previous = self.state;
        match event {
            Event::ConnectSucceeded(stream) => {
                self.abort.register(stream.try_clone().ok());
                self.stream = Some(stream);
                self.state = ConnectionState::Connected;
            }
            Event::ConnectFailed => {
                self.stream = None;
                self.state = ConnectionState::Disconnected;
            }
            Event::IoFailed => {
                self.abort.register(None);
                self.stream = None;
                self.state = ConnectionState::Faulted;
            }
            Event::Closed => {
                self.abort.register(None);
                if let Some(stream) = self.stream.take() {
                    if let Err(e) = stream.shutdown(Shutdown::Both) {
                        debug!("shutdown del socket al cerrar: {}", e);
                    }
                }
                self.state = ConnectionState::Disconnected;
            }
        }

        if previous != self.state {
            debug!("conexión {:?} -> {:?}", previous, self.state);
        }
    }

    /// Abre el socket. No reintenta: el fallo sube al llamador.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.abort.is_aborted() {
            return Err(ConnectionError::Closed);
        }

        match self.open_stream() {
            Ok(stream) => {
                info!("✅ Conectado al servidor de inferencia {}", self.settings.addr);
                self.transition(Event::ConnectSucceeded(stream));
                Ok(())
            }
            Err(source) => {
                self.transition(Event::ConnectFailed);
                Err(ConnectionError::Refused {
                    addr: self.settings.addr.clone(),
                    source,
                })
            }
        }
    }

    /// Conexión inicial acotada: hasta `attempts` intentos separados por `delay`
    pub fn connect_with_retry(
        &mut self,
        attempts: u32,
        delay: Duration,
    ) -> Result<(), ConnectionError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.connect() {
                Ok(()) => return Ok(()),
                Err(ConnectionError::Closed) => return Err(ConnectionError::Closed),
                Err(e) if attempt >= attempts => {
                    warn!(
                        "❌ Sin conexión tras {} intentos. ¿Está corriendo el servidor?",
                        attempts
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!("{} ({}/{}), reintentando en {:?}", e, attempt, attempts, delay);
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Envía una petición completa y lee una respuesta.
    /// Si el intercambio falla, reconecta una vez y reintenta una sola vez.
    pub fn request(&mut self, bytes: &[u8]) -> Result<Vec<u8>, ConnectionError> {
        if self.abort.is_aborted() {
            return Err(ConnectionError::Closed);
        }

        if self.state != ConnectionState::Connected {
            self.connect()?;
        }

        let first_error = match self.exchange(bytes) {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        if self.abort.is_aborted() {
            self.transition(Event::Closed);
            return Err(ConnectionError::Closed);
        }

        warn!("⚠️  Conexión perdida ({}), reconectando...", first_error);
        self.transition(Event::IoFailed);
        self.connect()?;
        self.reconnects += 1;

        match self.exchange(bytes) {
            Ok(response) => Ok(response),
            Err(_) if self.abort.is_aborted() => {
                self.transition(Event::Closed);
                Err(ConnectionError::Closed)
            }
            Err(e) => {
                self.transition(Event::IoFailed);
                Err(ConnectionError::Lost(e))
            }
        }
    }

    /// Cierra el socket. Una petición posterior vuelve a conectar.
    pub fn close(&mut self) {
        if self.stream.is_some() {
            info!("🔌 Cerrando conexión con {}", self.settings.addr);
        }
        self.transition(Event::Closed);
    }

    fn open_stream(&self) -> io::Result<TcpStream> {
        let mut last_error = None;
        for addr in self.settings.addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.settings.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(Some(self.settings.io_timeout))?;
                    stream.set_write_timeout(Some(self.settings.io_timeout))?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", self.settings.addr),
            )
        }))
    }

    /// Un intercambio: escritura completa + una lectura acotada
    fn exchange(&mut self, bytes: &[u8]) -> io::Result<Vec<u8>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no stream"))?;

        stream.write_all(bytes)?;
        stream.flush()?;

        let mut buffer = vec![0u8; self.settings.max_response_bytes];
        let n = stream.read(&mut buffer)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ));
        }
        buffer.truncate(n);
        Ok(buffer)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.transition(Event::Closed);
    }
}
