use crate::message::{decode, encode, ControlMsg, WireError, MAX_FRAME_LEN};
use crate::queue_pair::QpValue;
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

/// How many times `connect_to_server` tries before giving up
const CONNECT_ATTEMPTS: u32 = 5;
/// Fixed backoff between connection attempts
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Upper bound on one accept-poll slice, keeps cancellation responsive
const ACCEPT_POLL_SLICE: Duration = Duration::from_millis(50);

/// Connection lifecycle of a control channel.
///
/// `Error` is absorbing: once entered, only `close` leaves it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// no transport resources held
    Disconnected,
    /// listener bound, waiting for the peer
    Connecting,
    /// stream established, messages may flow
    Connected,
    /// a transport fault occurred; terminal until `close`
    Error,
}

/// Why a control-channel operation failed. The display form of the last
/// failure is retained and readable through `last_error`.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// the operation is not legal in the channel's current state
    #[error("channel is in state {0:?}, operation requires {1:?}")]
    WrongState(ConnectionState, ConnectionState),
    /// binding the listening socket failed
    #[error("failed to bind listener on port {port}: {source}")]
    Bind {
        /// requested listen port
        port: u16,
        /// underlying socket error
        source: io::Error,
    },
    /// accepting the incoming connection failed hard
    #[error("failed to accept connection: {0}")]
    Accept(io::Error),
    /// the server address did not parse
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// every connection attempt failed
    #[error("connection failed after {attempts} attempts: {source}")]
    Connect {
        /// attempts made
        attempts: u32,
        /// error of the last attempt
        source: io::Error,
    },
    /// reading or writing the stream failed hard
    #[error("i/o failure on control stream: {0}")]
    Io(io::Error),
    /// a frame declared a length outside the sanity bound
    #[error("frame length {0} outside (0, {MAX_FRAME_LEN}]")]
    FrameLength(u32),
    /// the deadline expired before a full frame arrived
    #[error("timed out waiting on the control stream")]
    Timeout,
    /// the frame arrived but did not decode
    #[error("failed to decode frame: {0}")]
    Decode(WireError),
    /// the outgoing message does not fit in one frame
    #[error("message of {0} bytes exceeds the frame bound {MAX_FRAME_LEN}")]
    Oversized(usize),
}

impl ChannelError {
    /// Whether this failure leaves the channel unusable. Timeouts,
    /// decode failures, and state-precondition misses keep the prior state;
    /// everything else is a transport fault.
    fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Timeout | Self::Decode(_) | Self::WrongState(..) | Self::Oversized(_)
        )
    }
}

/// Mutable state of a channel endpoint, all behind one instance lock
#[derive(Debug)]
struct ChannelInner {
    /// lifecycle state
    state: ConnectionState,
    /// bound listener, server side only
    listener: Option<TcpListener>,
    /// established stream
    stream: Option<TcpStream>,
    /// peer IP address in display form, set once connected
    peer_address: String,
    /// peer TCP port, set once connected
    peer_port: u16,
    /// display form of the last failure
    last_error: String,
}

impl ChannelInner {
    /// Remember a failure and move to `Error` when it is fatal
    fn record(&mut self, err: &ChannelError) {
        self.last_error = err.to_string();
        if err.is_fatal() {
            error!("control channel fault: {err}");
            self.state = ConnectionState::Error;
        } else {
            debug!("control channel: {err}");
        }
    }
}

/// A bidirectional control-channel endpoint carrying the out-of-band
/// connection handshake over a reliable stream transport.
///
/// Frames are length-prefixed: a 4-byte big-endian payload length followed
/// by the payload, which must be between 1 and `MAX_FRAME_LEN` bytes.
/// Every public operation serializes on one per-instance lock, so sends
/// and receives on a single endpoint never interleave.
#[derive(Debug)]
pub struct ControlChannel {
    /// endpoint state behind the per-instance lock
    inner: Mutex<ChannelInner>,
}

impl ControlChannel {
    /// Create a disconnected endpoint
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                state: ConnectionState::Disconnected,
                listener: None,
                stream: None,
                peer_address: String::new(),
                peer_port: 0,
                last_error: String::new(),
            }),
        }
    }

    /// Bind and listen on `port`, moving the channel to `Connecting`.
    /// Returns false when the channel is not `Disconnected` or the bind
    /// fails.
    pub fn start_server(&self, port: u16) -> bool {
        let mut inner = self.inner.lock();
        match start_server_inner(&mut inner, port) {
            Ok(()) => true,
            Err(err) => {
                inner.record(&err);
                false
            }
        }
    }

    /// Wait up to `timeout_ms` for the first incoming connection. On
    /// success the peer address and port are recorded and the channel is
    /// `Connected`; on timeout the channel stays `Connecting`.
    pub fn accept_connection(&self, timeout_ms: u32) -> bool {
        let mut inner = self.inner.lock();
        match accept_connection_inner(&mut inner, timeout_ms) {
            Ok(()) => true,
            Err(err) => {
                inner.record(&err);
                false
            }
        }
    }

    /// Connect to a listening peer, retrying up to five times with a fixed
    /// one-second backoff. After the final failed attempt the channel is in
    /// `Error`.
    pub fn connect_to_server(&self, server_ip: &str, port: u16) -> bool {
        let mut inner = self.inner.lock();
        match connect_to_server_inner(&mut inner, server_ip, port) {
            Ok(()) => true,
            Err(err) => {
                inner.record(&err);
                false
            }
        }
    }

    /// Send one framed message. Returns false and enters `Error` on a
    /// transport fault.
    pub fn send_message(&self, msg: &ControlMsg) -> bool {
        let mut inner = self.inner.lock();
        match send_message_inner(&mut inner, msg) {
            Ok(()) => true,
            Err(err) => {
                inner.record(&err);
                false
            }
        }
    }

    /// Receive one framed message within `timeout_ms`.
    ///
    /// Returns `None` on timeout (channel state preserved), on a decode
    /// failure (state preserved, error recorded), or on a transport fault
    /// (channel enters `Error`). A frame declaring a length of 0 or more
    /// than `MAX_FRAME_LEN` is a transport fault.
    pub fn receive_message(&self, timeout_ms: u32) -> Option<ControlMsg> {
        let mut inner = self.inner.lock();
        match receive_message_inner(&mut inner, timeout_ms) {
            Ok(msg) => Some(msg),
            Err(err) => {
                inner.record(&err);
                None
            }
        }
    }

    /// Send a `CONNECT_REQUEST` carrying the local queue pair identity
    pub fn send_connect_request(&self, qp_info: &QpValue) -> bool {
        self.send_message(&ControlMsg::connect_request(qp_info.clone()))
    }

    /// Send a `CONNECT_RESPONSE` with the acceptor's queue pair identity
    /// and verdict
    pub fn send_connect_response(&self, qp_info: &QpValue, accept: bool) -> bool {
        self.send_message(&ControlMsg::connect_response(qp_info.clone(), accept))
    }

    /// Send a `READY` notification
    pub fn send_ready(&self) -> bool {
        self.send_message(&ControlMsg::ready())
    }

    /// Send an `ERROR` notification. The channel transitions to `Error`
    /// whether or not the send succeeds.
    pub fn send_error(&self, text: &str) -> bool {
        let mut inner = self.inner.lock();
        let result = send_message_inner(&mut inner, &ControlMsg::error(text));
        let sent = match result {
            Ok(()) => true,
            Err(err) => {
                inner.record(&err);
                false
            }
        };
        inner.state = ConnectionState::Error;
        sent
    }

    /// Drop the transport resources and return to `Disconnected`. This is
    /// the only way out of `Error`.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.listener = None;
        inner.stream = None;
        inner.state = ConnectionState::Disconnected;
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Display form of the last failure
    #[must_use]
    pub fn last_error(&self) -> String {
        self.inner.lock().last_error.clone()
    }

    /// Peer IP address, empty until connected
    #[must_use]
    pub fn peer_address(&self) -> String {
        self.inner.lock().peer_address.clone()
    }

    /// Peer TCP port, 0 until connected
    #[must_use]
    pub fn peer_port(&self) -> u16 {
        self.inner.lock().peer_port
    }
}

impl Default for ControlChannel {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Bind, listen, and go non-blocking so accept can poll with a deadline
fn start_server_inner(inner: &mut ChannelInner, port: u16) -> Result<(), ChannelError> {
    if inner.state != ConnectionState::Disconnected {
        return Err(ChannelError::WrongState(
            inner.state,
            ConnectionState::Disconnected,
        ));
    }
    let listener =
        TcpListener::bind(("0.0.0.0", port)).map_err(|source| ChannelError::Bind { port, source })?;
    listener
        .set_nonblocking(true)
        .map_err(ChannelError::Io)?;
    inner.listener = Some(listener);
    inner.state = ConnectionState::Connecting;
    debug!("control channel listening on port {port}");
    Ok(())
}

/// Poll the non-blocking listener until a peer arrives or the deadline
/// expires
fn accept_connection_inner(inner: &mut ChannelInner, timeout_ms: u32) -> Result<(), ChannelError> {
    if inner.state != ConnectionState::Connecting {
        return Err(ChannelError::WrongState(
            inner.state,
            ConnectionState::Connecting,
        ));
    }
    let deadline = Instant::now()
        .checked_add(Duration::from_millis(timeout_ms.into()))
        .unwrap_or_else(Instant::now);
    let (stream, peer) = loop {
        let listener = inner.listener.as_ref().ok_or(ChannelError::WrongState(
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
        ))?;
        match listener.accept() {
            Ok(pair) => break pair,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ChannelError::Timeout);
                }
                thread::sleep(ACCEPT_POLL_SLICE.min(deadline.saturating_duration_since(now)));
            }
            Err(err) => return Err(ChannelError::Accept(err)),
        }
    };
    stream.set_nonblocking(false).map_err(ChannelError::Io)?;
    inner.peer_address = peer.ip().to_string();
    inner.peer_port = peer.port();
    inner.stream = Some(stream);
    inner.state = ConnectionState::Connected;
    debug!(
        "control channel accepted peer {}:{}",
        inner.peer_address, inner.peer_port
    );
    Ok(())
}

/// Dial the server with fixed-backoff retries
fn connect_to_server_inner(
    inner: &mut ChannelInner,
    server_ip: &str,
    port: u16,
) -> Result<(), ChannelError> {
    if inner.state != ConnectionState::Disconnected {
        return Err(ChannelError::WrongState(
            inner.state,
            ConnectionState::Disconnected,
        ));
    }
    let ip: IpAddr = server_ip
        .parse()
        .map_err(|_parse_err| ChannelError::InvalidAddress(server_ip.to_owned()))?;
    let addr = SocketAddr::new(ip, port);
    let mut last = io::Error::new(io::ErrorKind::Other, "no connection attempt made");
    for attempt in 1..=CONNECT_ATTEMPTS {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                inner.peer_address = server_ip.to_owned();
                inner.peer_port = port;
                inner.stream = Some(stream);
                inner.state = ConnectionState::Connected;
                debug!("control channel connected to {server_ip}:{port} on attempt {attempt}");
                return Ok(());
            }
            Err(err) => {
                debug!("connection attempt {attempt}/{CONNECT_ATTEMPTS} failed: {err}");
                last = err;
                if attempt < CONNECT_ATTEMPTS {
                    thread::sleep(CONNECT_RETRY_DELAY);
                }
            }
        }
    }
    Err(ChannelError::Connect {
        attempts: CONNECT_ATTEMPTS,
        source: last,
    })
}

/// Frame and write one message
fn send_message_inner(inner: &mut ChannelInner, msg: &ControlMsg) -> Result<(), ChannelError> {
    if inner.state != ConnectionState::Connected {
        return Err(ChannelError::WrongState(
            inner.state,
            ConnectionState::Connected,
        ));
    }
    let Some(stream) = inner.stream.as_ref() else {
        return Err(ChannelError::WrongState(
            inner.state,
            ConnectionState::Connected,
        ));
    };
    let payload = encode(msg);
    if payload.len() > MAX_FRAME_LEN {
        return Err(ChannelError::Oversized(payload.len()));
    }
    let len: u32 = payload.len().try_into().map_err(|_overflow| {
        ChannelError::Oversized(payload.len())
    })?;
    let mut writer: &TcpStream = stream;
    writer
        .write_all(&len.to_be_bytes())
        .map_err(ChannelError::Io)?;
    writer.write_all(&payload).map_err(ChannelError::Io)?;
    Ok(())
}

/// Read and decode one message under a single deadline covering both the
/// header and the body
fn receive_message_inner(
    inner: &mut ChannelInner,
    timeout_ms: u32,
) -> Result<ControlMsg, ChannelError> {
    if inner.state != ConnectionState::Connected {
        return Err(ChannelError::WrongState(
            inner.state,
            ConnectionState::Connected,
        ));
    }
    let Some(stream) = inner.stream.as_ref() else {
        return Err(ChannelError::WrongState(
            inner.state,
            ConnectionState::Connected,
        ));
    };
    let deadline = Instant::now()
        .checked_add(Duration::from_millis(timeout_ms.into()))
        .unwrap_or_else(Instant::now);
    let mut header = [0_u8; 4];
    read_exact_deadline(stream, &mut header, deadline)?;
    let len = u32::from_be_bytes(header);
    let len_usize: usize = len.try_into().map_err(|_overflow| ChannelError::FrameLength(len))?;
    if len == 0 || len_usize > MAX_FRAME_LEN {
        return Err(ChannelError::FrameLength(len));
    }
    let mut payload = vec![0_u8; len_usize];
    read_exact_deadline(stream, &mut payload, deadline)?;
    decode(&payload).map_err(ChannelError::Decode)
}

/// Fill `buf` from the stream, giving up at `deadline`
fn read_exact_deadline(
    stream: &TcpStream,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<(), ChannelError> {
    let mut filled = 0_usize;
    while filled < buf.len() {
        let now = Instant::now();
        if now >= deadline {
            return Err(ChannelError::Timeout);
        }
        stream
            .set_read_timeout(Some(deadline.saturating_duration_since(now)))
            .map_err(ChannelError::Io)?;
        let mut reader: &TcpStream = stream;
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ChannelError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the control stream",
                )))
            }
            Ok(read) => filled = filled.saturating_add(read),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                return Err(ChannelError::Timeout)
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(ChannelError::Io(err)),
        }
    }
    Ok(())
}
