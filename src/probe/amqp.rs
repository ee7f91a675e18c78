//! RabbitMQ probe (AMQP 0-9-1 connection and channel open).
//!
//! # Responsibilities
//! - Open a TCP connection to the broker
//! - Negotiate the connection: Start/Start-Ok (PLAIN), Tune/Tune-Ok, Open/Open-Ok on the vhost
//! - Open one channel, then close the connection
//!
//! # Design Decisions
//! - Only the connection and channel methods are spoken; nothing is declared
//! - Heartbeats are declined in Tune-Ok; the connection lives for one attempt
//! - The whole exchange shares one timeout
//! - A broker refusal (`Connection.Close` / `Channel.Close`) carries its reply code and text

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::schema::AmqpProbeConfig;
use crate::probe::{delegate_state, Probe, ProbeError, ProbeState};

pub const KIND: &str = "rabbitmq";

pub const DEFAULT_VHOST: &str = "/";

const CONNECT_CONTEXT: &str = "error connecting to rabbitmq instance";
const HANDSHAKE_CONTEXT: &str = "error negotiating rabbitmq connection";
const CHANNEL_CONTEXT: &str = "error establishing channel to rabbitmq";

const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x00\x00\x09\x01";
const FRAME_METHOD: u8 = 1;
const FRAME_END: u8 = 0xCE;
const MAX_FRAME_SIZE: u32 = 128 * 1024;

const CONNECTION_CHANNEL: u16 = 0;
const CHECK_CHANNEL: u16 = 1;

const CLASS_CONNECTION: u16 = 10;
const CLASS_CHANNEL: u16 = 20;

const CONNECTION_START: u16 = 10;
const CONNECTION_START_OK: u16 = 11;
const CONNECTION_TUNE: u16 = 30;
const CONNECTION_TUNE_OK: u16 = 31;
const CONNECTION_OPEN: u16 = 40;
const CONNECTION_OPEN_OK: u16 = 41;
const CONNECTION_CLOSE: u16 = 50;

const CHANNEL_OPEN: u16 = 10;
const CHANNEL_OPEN_OK: u16 = 11;
const CHANNEL_CLOSE: u16 = 40;

const REPLY_SUCCESS: u16 = 200;

/// Failure while speaking AMQP to the broker.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("broker does not speak AMQP 0-9-1")]
    ProtocolMismatch,

    #[error("unexpected frame type {0}")]
    UnexpectedFrameType(u8),

    #[error("unexpected method {class}.{method} on channel {channel}")]
    UnexpectedMethod { channel: u16, class: u16, method: u16 },

    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(u32),

    #[error("malformed frame")]
    Malformed,

    #[error("refused by broker ({code}): {text}")]
    Refused { code: u16, text: String },
}

/// One decoded method frame.
#[derive(Debug)]
struct Method {
    channel: u16,
    class: u16,
    method: u16,
    args: Vec<u8>,
}

impl Method {
    fn id(&self) -> (u16, u16) {
        (self.class, self.method)
    }

    fn unexpected(&self) -> HandshakeError {
        HandshakeError::UnexpectedMethod {
            channel: self.channel,
            class: self.class,
            method: self.method,
        }
    }
}

/// Checks that a broker accepts a connection on the vhost and opens a channel.
pub struct AmqpProbe {
    kind: String,
    host: String,
    port: u16,
    user: String,
    password: String,
    vhost: String,
    timeout: Duration,
    state: ProbeState,
}

impl AmqpProbe {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            kind: KIND.to_string(),
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            vhost: DEFAULT_VHOST.to_string(),
            timeout,
            state: ProbeState::new(),
        }
    }

    pub fn with_vhost(mut self, vhost: impl Into<String>) -> Self {
        self.vhost = vhost.into();
        self
    }

    pub fn from_config(config: &AmqpProbeConfig) -> Self {
        let mut probe = Self::new(
            config.host.clone(),
            config.port,
            config.user.clone(),
            config.password.clone(),
            Duration::from_millis(config.timeout_ms),
        )
        .with_vhost(config.vhost.clone());
        if let Some(name) = &config.name {
            probe.kind = name.clone();
        }
        probe
    }

    async fn attempt(&self) -> Result<(), ProbeError> {
        let addr = format!("{}:{}", self.host, self.port);
        let exchange = async {
            let mut stream = TcpStream::connect(&addr)
                .await
                .map_err(|e| ProbeError::new(CONNECT_CONTEXT, e))?;
            open_connection(&mut stream, &self.user, &self.password, &self.vhost)
                .await
                .map_err(|e| ProbeError::new(HANDSHAKE_CONTEXT, e))?;
            open_channel(&mut stream)
                .await
                .map_err(|e| ProbeError::new(CHANNEL_CONTEXT, e))?;
            close_connection(&mut stream).await;
            Ok(())
        };

        match timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::msg(
                CONNECT_CONTEXT,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }
}

impl std::fmt::Debug for AmqpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpProbe")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("vhost", &self.vhost)
            .finish()
    }
}

#[async_trait]
impl Probe for AmqpProbe {
    fn kind(&self) -> &str {
        &self.kind
    }

    delegate_state!();

    async fn execute(&self) -> Result<(), ProbeError> {
        self.state.begin();
        self.state.checking();
        let result = self.attempt().await;
        if let Err(e) = &result {
            tracing::debug!(host = %self.host, port = self.port, vhost = %self.vhost, error = %e, "RabbitMQ probe failed");
        }
        self.state.finish(result)
    }
}

/// Client side of connection negotiation, up to Connection.Open-Ok.
async fn open_connection<S>(
    stream: &mut S,
    user: &str,
    password: &str,
    vhost: &str,
) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(PROTOCOL_HEADER).await?;

    let start = read_method(stream).await?;
    if start.id() != (CLASS_CONNECTION, CONNECTION_START) {
        return Err(start.unexpected());
    }
    stream.write_all(&start_ok_frame(user, password)).await?;
    stream.flush().await?;

    let tune = read_method(stream).await?;
    match tune.id() {
        (CLASS_CONNECTION, CONNECTION_TUNE) => {}
        (CLASS_CONNECTION, CONNECTION_CLOSE) => return Err(parse_close(&tune.args)),
        _ => return Err(tune.unexpected()),
    }
    stream.write_all(&tune_ok_frame(&tune.args)?).await?;
    stream.write_all(&open_frame(vhost)).await?;
    stream.flush().await?;

    let opened = read_method(stream).await?;
    match opened.id() {
        (CLASS_CONNECTION, CONNECTION_OPEN_OK) => Ok(()),
        (CLASS_CONNECTION, CONNECTION_CLOSE) => Err(parse_close(&opened.args)),
        _ => Err(opened.unexpected()),
    }
}

/// Open channel 1 and wait for Channel.Open-Ok.
async fn open_channel<S>(stream: &mut S) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // reserved-1: empty short string
    stream
        .write_all(&method_frame(CHECK_CHANNEL, CLASS_CHANNEL, CHANNEL_OPEN, &[0]))
        .await?;
    stream.flush().await?;

    let reply = read_method(stream).await?;
    match (reply.channel, reply.id()) {
        (CHECK_CHANNEL, (CLASS_CHANNEL, CHANNEL_OPEN_OK)) => Ok(()),
        (CHECK_CHANNEL, (CLASS_CHANNEL, CHANNEL_CLOSE))
        | (CONNECTION_CHANNEL, (CLASS_CONNECTION, CONNECTION_CLOSE)) => Err(parse_close(&reply.args)),
        _ => Err(reply.unexpected()),
    }
}

/// Send Connection.Close and drop the socket without waiting for Close-Ok.
async fn close_connection<S>(stream: &mut S)
where
    S: AsyncWrite + Unpin,
{
    let mut args = Vec::new();
    args.extend_from_slice(&REPLY_SUCCESS.to_be_bytes());
    push_short_str(&mut args, "Goodbye");
    args.extend_from_slice(&0u16.to_be_bytes());
    args.extend_from_slice(&0u16.to_be_bytes());
    let frame = method_frame(CONNECTION_CHANNEL, CLASS_CONNECTION, CONNECTION_CLOSE, &args);
    if let Err(e) = stream.write_all(&frame).await {
        tracing::debug!(error = %e, "Failed to close rabbitmq probe connection");
    }
    let _ = stream.shutdown().await;
}

/// Read one method frame.
async fn read_method<S>(stream: &mut S) -> Result<Method, HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).await?;
    if &header[..4] == b"AMQP" {
        return Err(HandshakeError::ProtocolMismatch);
    }
    if header[0] != FRAME_METHOD {
        return Err(HandshakeError::UnexpectedFrameType(header[0]));
    }

    let channel = u16::from_be_bytes([header[1], header[2]]);
    let size = u32::from_be_bytes([header[3], header[4], header[5], header[6]]);
    if size > MAX_FRAME_SIZE {
        return Err(HandshakeError::FrameTooLarge(size));
    }
    let mut payload = vec![0u8; size as usize + 1];
    stream.read_exact(&mut payload).await?;
    if payload.pop() != Some(FRAME_END) || payload.len() < 4 {
        return Err(HandshakeError::Malformed);
    }

    Ok(Method {
        channel,
        class: u16::from_be_bytes([payload[0], payload[1]]),
        method: u16::from_be_bytes([payload[2], payload[3]]),
        args: payload.split_off(4),
    })
}

fn method_frame(channel: u16, class: u16, method: u16, args: &[u8]) -> Vec<u8> {
    let size = (args.len() + 4) as u32;
    let mut frame = Vec::with_capacity(args.len() + 12);
    frame.push(FRAME_METHOD);
    frame.extend_from_slice(&channel.to_be_bytes());
    frame.extend_from_slice(&size.to_be_bytes());
    frame.extend_from_slice(&class.to_be_bytes());
    frame.extend_from_slice(&method.to_be_bytes());
    frame.extend_from_slice(args);
    frame.push(FRAME_END);
    frame
}

fn start_ok_frame(user: &str, password: &str) -> Vec<u8> {
    let mut args = Vec::new();
    // empty client-properties table
    args.extend_from_slice(&0u32.to_be_bytes());
    push_short_str(&mut args, "PLAIN");
    let response = format!("\0{user}\0{password}");
    args.extend_from_slice(&(response.len() as u32).to_be_bytes());
    args.extend_from_slice(response.as_bytes());
    push_short_str(&mut args, "en_US");
    method_frame(CONNECTION_CHANNEL, CLASS_CONNECTION, CONNECTION_START_OK, &args)
}

/// Accept the broker's channel-max and frame-max, decline heartbeats.
fn tune_ok_frame(tune_args: &[u8]) -> Result<Vec<u8>, HandshakeError> {
    let limits = tune_args.get(..6).ok_or(HandshakeError::Malformed)?;
    let mut args = limits.to_vec();
    args.extend_from_slice(&0u16.to_be_bytes());
    Ok(method_frame(CONNECTION_CHANNEL, CLASS_CONNECTION, CONNECTION_TUNE_OK, &args))
}

fn open_frame(vhost: &str) -> Vec<u8> {
    let mut args = Vec::new();
    push_short_str(&mut args, vhost);
    // reserved-1 (capabilities), reserved-2 (insist)
    args.push(0);
    args.push(0);
    method_frame(CONNECTION_CHANNEL, CLASS_CONNECTION, CONNECTION_OPEN, &args)
}

fn push_short_str(buf: &mut Vec<u8>, s: &str) {
    let len = s.len().min(u8::MAX as usize);
    buf.push(len as u8);
    buf.extend_from_slice(&s.as_bytes()[..len]);
}

/// Decode reply-code and reply-text of Connection.Close or Channel.Close.
fn parse_close(args: &[u8]) -> HandshakeError {
    if args.len() < 3 {
        return HandshakeError::Malformed;
    }
    let code = u16::from_be_bytes([args[0], args[1]]);
    let len = args[2] as usize;
    let text = args
        .get(3..3 + len)
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default();
    HandshakeError::Refused { code, text }
}
