//! Per-connection state machine.
//!
//! A [`ConnectionContext`] is owned by exactly one task while armed. It reads
//! into a pooled buffer, feeds the bytes to its [`RequestAssembler`], hands
//! each finished request to the [`Dispatcher`] and writes the response before
//! reading again, so pipelined requests are answered strictly in order.

use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

use crate::config::ServerConfig;
use crate::http::assembler::RequestAssembler;
use crate::http::dispatch::Dispatcher;
use crate::http::parser::ParseError;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::pool::ObjectPool;

/// Byte stream a context can serve.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub keep_alive_timeout: Duration,
    pub keep_alive_max_requests: u32,
    pub buffer_size: usize,
    pub max_request_bytes: usize,
    pub expose_error_details: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            keep_alive_timeout: cfg.keep_alive_timeout(),
            keep_alive_max_requests: cfg.keep_alive_max_requests,
            buffer_size: cfg.buffer_size,
            max_request_bytes: cfg.max_request_bytes,
            expose_error_details: cfg.expose_error_details,
        }
    }
}

/// Everything a context needs that outlives it.
#[derive(Debug)]
pub struct ConnectionServices {
    pub dispatcher: Arc<Dispatcher>,
    pub buffers: ObjectPool<BytesMut>,
    pub writer: ResponseWriter,
    pub settings: ConnectionSettings,
}

impl ConnectionServices {
    pub fn new(dispatcher: Dispatcher, settings: ConnectionSettings) -> Self {
        let buffer_size = settings.buffer_size;
        Self {
            dispatcher: Arc::new(dispatcher),
            buffers: ObjectPool::new(move || BytesMut::with_capacity(buffer_size)),
            writer: ResponseWriter::new(),
            settings,
        }
    }
}

/// What the writing state sends.
#[derive(Debug)]
pub enum Outgoing {
    Response { response: Response, head_only: bool },
    ErrorPage { response: Response, detail: Option<String> },
}

#[derive(Debug)]
pub enum ConnectionState {
    /// Pooled, no socket.
    Idle,
    /// Waiting for bytes, bounded by the keep-alive deadline.
    Reading,
    /// `n` fresh bytes are in the buffer.
    Parsing(usize),
    Dispatching(Request),
    Writing(Outgoing),
    Closed,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Reading => "reading",
            ConnectionState::Parsing(_) => "parsing",
            ConnectionState::Dispatching(_) => "dispatching",
            ConnectionState::Writing(_) => "writing",
            ConnectionState::Closed => "closed",
        }
    }
}

pub struct ConnectionContext {
    id: u64,
    socket: Option<Box<dyn Transport>>,
    peer: Option<SocketAddr>,
    buffer: Option<BytesMut>,
    assembler: RequestAssembler,
    state: ConnectionState,
    /// Residual bytes may hold a complete pipelined request.
    reparse: bool,
    served: u32,
    deadline: Option<Instant>,
    disposed: bool,
}

impl ConnectionContext {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            socket: None,
            peer: None,
            buffer: None,
            assembler: RequestAssembler::new(),
            state: ConnectionState::Idle,
            reparse: false,
            served: 0,
            deadline: None,
            disposed: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Requests answered on the current connection.
    pub fn served(&self) -> u32 {
        self.served
    }

    /// True while the context owns a live socket.
    pub fn is_armed(&self) -> bool {
        self.socket.is_some()
    }

    /// Binds a fresh connection to this context.
    pub fn arm(&mut self, socket: Box<dyn Transport>, peer: Option<SocketAddr>, buffer: BytesMut) {
        self.socket = Some(socket);
        self.peer = peer;
        self.buffer = Some(buffer);
        self.assembler.reset();
        self.state = ConnectionState::Reading;
        self.reparse = false;
        self.served = 0;
        self.deadline = None;
        self.disposed = false;
    }

    /// Returns the context to its pooled state.
    pub fn disarm(&mut self) {
        self.socket = None;
        self.peer = None;
        self.state = ConnectionState::Idle;
    }

    /// Drives the connection until it closes, then releases the buffer.
    pub async fn run(&mut self, services: &ConnectionServices, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!(conn = self.id, peer = ?self.peer, "Connection started");
        self.assembler.set_max_body(services.settings.max_request_bytes);

        loop {
            if matches!(self.state, ConnectionState::Idle | ConnectionState::Closed) {
                break;
            }
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);
            self.state = match state {
                ConnectionState::Reading => self.read(services, &mut shutdown).await,
                ConnectionState::Parsing(n) => self.parse(n, services),
                ConnectionState::Dispatching(req) => self.dispatch(req, services, &shutdown).await,
                ConnectionState::Writing(outgoing) => self.write(outgoing, services).await,
                ConnectionState::Idle | ConnectionState::Closed => ConnectionState::Closed,
            };
            tracing::trace!(conn = self.id, state = self.state.name(), "State changed");
        }

        self.close(services).await;
    }

    async fn read(&mut self, services: &ConnectionServices, shutdown: &mut watch::Receiver<bool>) -> ConnectionState {
        if self.reparse {
            self.reparse = false;
            return ConnectionState::Parsing(0);
        }
        if *shutdown.borrow() && !self.assembler.in_message() {
            return ConnectionState::Closed;
        }

        let settings = &services.settings;
        let buffered = self.buffer.as_ref().map_or(0, |b| b.len());
        if buffered >= settings.max_request_bytes {
            return self.protocol_error(ParseError::RequestTooLarge(settings.max_request_bytes), services);
        }

        let (Some(socket), Some(buffer)) = (self.socket.as_mut(), self.buffer.as_mut()) else {
            return ConnectionState::Closed;
        };
        buffer.reserve(settings.buffer_size);

        let deadline = Instant::now() + settings.keep_alive_timeout;
        self.deadline = Some(deadline);

        tokio::select! {
            res = socket.read_buf(buffer) => match res {
                Ok(0) => {
                    tracing::debug!(conn = self.id, "Peer closed connection");
                    ConnectionState::Closed
                }
                Ok(n) => ConnectionState::Parsing(n),
                Err(e) => {
                    tracing::debug!(conn = self.id, error = %e, "Read failed");
                    ConnectionState::Closed
                }
            },
            _ = sleep_until(deadline) => {
                tracing::debug!(conn = self.id, served = self.served, "Keep-alive deadline expired");
                ConnectionState::Closed
            }
            changed = shutdown.changed() => {
                if changed.is_err() || !self.assembler.in_message() {
                    ConnectionState::Closed
                } else {
                    ConnectionState::Reading
                }
            }
        }
    }

    fn parse(&mut self, received: usize, services: &ConnectionServices) -> ConnectionState {
        let Some(buffer) = self.buffer.as_mut() else {
            return ConnectionState::Closed;
        };

        match self.assembler.feed(&buffer[..]) {
            Ok(consumed) => {
                buffer.advance(consumed);
                tracing::trace!(conn = self.id, received, consumed, residual = buffer.len(), "Fed tokenizer");
                match self.assembler.next_request() {
                    Some(req) => {
                        self.reparse = !buffer.is_empty();
                        ConnectionState::Dispatching(req)
                    }
                    None => ConnectionState::Reading,
                }
            }
            Err(e) => self.protocol_error(e, services),
        }
    }

    async fn dispatch(
        &mut self,
        req: Request,
        services: &ConnectionServices,
        shutdown: &watch::Receiver<bool>,
    ) -> ConnectionState {
        self.served += 1;
        let keep_alive = req.keep_alive
            && self.served < services.settings.keep_alive_max_requests
            && !*shutdown.borrow();
        let head_only = req.method == Method::HEAD;

        tracing::debug!(conn = self.id, method = %req.method, path = %req.path, "Dispatching request");

        let dispatcher = services.dispatcher.clone();
        let handled = tokio::task::spawn_blocking(move || {
            let result = dispatcher.dispatch(&req, keep_alive);
            (req, result)
        })
        .await;

        match handled {
            Ok((_, Ok(response))) => ConnectionState::Writing(Outgoing::Response { response, head_only }),
            Ok((req, Err(e))) => {
                let status = e.status();
                if status == StatusCode::InternalServerError {
                    tracing::error!(conn = self.id, path = %req.path, error = %e, "Request failed");
                } else {
                    tracing::debug!(conn = self.id, path = %req.path, status = status.as_u16(), error = %e, "Request rejected");
                }
                let keep_alive = keep_alive && !e.closes_connection();
                let response = services.dispatcher.error_response(Some(&req), status, keep_alive);
                let detail = services.settings.expose_error_details.then(|| e.to_string());
                if head_only {
                    ConnectionState::Writing(Outgoing::Response { response, head_only })
                } else {
                    ConnectionState::Writing(Outgoing::ErrorPage { response, detail })
                }
            }
            Err(e) => {
                tracing::error!(conn = self.id, error = %e, "Request handler panicked");
                let response = services
                    .dispatcher
                    .error_response(None, StatusCode::InternalServerError, false);
                let detail = services.settings.expose_error_details.then(|| e.to_string());
                ConnectionState::Writing(Outgoing::ErrorPage { response, detail })
            }
        }
    }

    async fn write(&mut self, outgoing: Outgoing, services: &ConnectionServices) -> ConnectionState {
        let Some(socket) = self.socket.as_mut() else {
            return ConnectionState::Closed;
        };
        let writer = services.writer;

        let (sent, keep_alive) = match outgoing {
            Outgoing::Response { response, head_only } => {
                let sent = writer.send(socket, &response, head_only).await;
                (sent, response.keep_alive())
            }
            Outgoing::ErrorPage { response, detail } => {
                let keep_alive = response.keep_alive();
                (writer.send_error_page(socket, response, detail.as_deref()).await, keep_alive)
            }
        };

        if sent && keep_alive {
            ConnectionState::Reading
        } else {
            ConnectionState::Closed
        }
    }

    /// A 400 that closes the connection. Bytes already received are dropped.
    fn protocol_error(&mut self, e: ParseError, services: &ConnectionServices) -> ConnectionState {
        tracing::debug!(conn = self.id, error = %e, "Malformed request");
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
        }
        self.assembler.reset();
        self.reparse = false;
        let response = services
            .dispatcher
            .error_response(None, StatusCode::BadRequest, false);
        let detail = services.settings.expose_error_details.then(|| e.to_string());
        ConnectionState::Writing(Outgoing::ErrorPage { response, detail })
    }

    /// Shuts the socket down and returns the buffer to the pool. Only the first
    /// call after [`arm`](Self::arm) has any effect.
    pub async fn close(&mut self, services: &ConnectionServices) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;

        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.shutdown().await {
                tracing::trace!(conn = self.id, error = %e, "Socket shutdown failed");
            }
        }
        if let Some(mut buffer) = self.buffer.take() {
            buffer.clear();
            services.buffers.release(buffer);
        }
        self.assembler.reset();
        self.deadline = None;
        self.state = ConnectionState::Closed;

        tracing::debug!(conn = self.id, peer = ?self.peer, served = self.served, "Connection closed");
        true
    }
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("id", &self.id)
            .field("state", &self.state.name())
            .field("armed", &self.is_armed())
            .field("served", &self.served)
            .finish()
    }
}
