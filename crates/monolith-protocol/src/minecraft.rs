//! Minecraft Java Edition Server List Ping.
//!
//! One status exchange per probe:
//!
//! ```text
//! C→S  Handshake (0x00: protocol, host, port, next state = status)
//! C→S  Status request (0x00)
//! S→C  Status response (0x00: JSON)
//! C→S  Ping (0x01: i64)
//! S→C  Pong (0x01: same i64)
//! ```
//!
//! The ping is optional. A missing or late pong never fails the probe; the
//! status round trip stands in for latency.
//!
//! Every packet is framed as `VarInt length ++ VarInt id ++ payload`.

use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use monolith_core::{GameServerStatus, ProbeError, ProbeResult, Prober, ServerInfo};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 25565;

/// Protocol number sent in the handshake. Servers answer status requests
/// for any protocol, so an old one keeps the exchange version-agnostic.
const HANDSHAKE_PROTOCOL: i32 = 47;
const NEXT_STATE_STATUS: i32 = 1;
const MAX_PACKET_LEN: usize = 1 << 20;
const NIL_UUID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Error)]
enum SlpError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("malformed status response: {0}")]
    Malformed(String),
}

impl SlpError {
    fn into_probe_error(self, address: &str) -> ProbeError {
        match self {
            // A peer that closes mid-exchange is speaking something else.
            Self::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                ProbeError::protocol(address, "connection closed during status exchange")
            }
            Self::Io(e) => ProbeError::unreachable(address, e),
            Self::Malformed(reason) => ProbeError::protocol(address, reason),
        }
    }
}

/// Split `host[:port]` into its parts. IPv6 literals need brackets to
/// carry a port (`[::1]:25566`).
pub fn parse_address(address: &str) -> Result<(String, u16), ProbeError> {
    let address = address.trim();
    let invalid = |reason: &str| ProbeError::protocol(address, format!("invalid address: {reason}"));

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| invalid("unclosed '['"))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => port.parse().map_err(|_| invalid("bad port"))?,
            None if tail.is_empty() => DEFAULT_PORT,
            None => return Err(invalid("unexpected text after ']'")),
        };
        return Ok((host.to_string(), port));
    }

    match address.rsplit_once(':') {
        // More than one colon without brackets is a bare IPv6 literal.
        Some((host, _)) if host.contains(':') => Ok((address.to_string(), DEFAULT_PORT)),
        Some((host, port)) => {
            if host.is_empty() {
                return Err(invalid("empty host"));
            }
            let port = port.parse().map_err(|_| invalid("bad port"))?;
            Ok((host.to_string(), port))
        }
        None if address.is_empty() => Err(invalid("empty host")),
        None => Ok((address.to_string(), DEFAULT_PORT)),
    }
}

// ── Status JSON ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StatusJson {
    #[serde(default)]
    version: Option<VersionJson>,
    #[serde(default)]
    players: Option<PlayersJson>,
    #[serde(default)]
    description: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct VersionJson {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayersJson {
    max: u32,
    online: u32,
    #[serde(default)]
    sample: Option<Vec<PlayerJson>>,
}

#[derive(Debug, Deserialize)]
struct PlayerJson {
    name: String,
    #[serde(default)]
    id: Option<String>,
}

fn status_from_json(raw: &str) -> Result<GameServerStatus, SlpError> {
    let json: StatusJson =
        serde_json::from_str(raw).map_err(|e| SlpError::Malformed(format!("invalid JSON: {e}")))?;

    let mut status = GameServerStatus {
        version: json.version.map(|v| v.name).unwrap_or_default(),
        motd: json.description.as_ref().map(flatten_description).unwrap_or_default(),
        ..Default::default()
    };

    if let Some(players) = json.players {
        status.player_count = players.online;
        status.max_players = players.max;
        // Servers pad the sample with placeholder lines under the nil UUID.
        status.player_names = players
            .sample
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.id.as_deref() != Some(NIL_UUID))
            .map(|p| p.name)
            .filter(|name| !name.is_empty())
            .collect();
        status.players_hidden = status.player_count > 0 && status.player_names.is_empty();
    }
    Ok(status)
}

/// Plain text of a description, which is either a string or a chat
/// component tree, with `§` formatting codes removed.
pub fn flatten_description(description: &Value) -> String {
    fn collect(value: &Value, out: &mut String) {
        match value {
            Value::String(s) => out.push_str(s),
            Value::Array(parts) => parts.iter().for_each(|p| collect(p, out)),
            Value::Object(map) => {
                if let Some(text) = map.get("text") {
                    collect(text, out);
                }
                if let Some(extra) = map.get("extra") {
                    collect(extra, out);
                }
            }
            _ => {}
        }
    }

    let mut raw = String::new();
    collect(description, &mut raw);
    strip_formatting(&raw).trim().to_string()
}

fn strip_formatting(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

// ── Framing ───────────────────────────────────────────────────────

fn put_varint(buf: &mut BytesMut, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7F == 0 {
            buf.put_u8(v as u8);
            return;
        }
        buf.put_u8(((v & 0x7F) | 0x80) as u8);
        v >>= 7;
    }
}

fn put_string(buf: &mut BytesMut, s: &str) {
    put_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

fn frame(id: i32, payload: &[u8]) -> BytesMut {
    let mut body = BytesMut::with_capacity(payload.len() + 5);
    put_varint(&mut body, id);
    body.put_slice(payload);

    let mut out = BytesMut::with_capacity(body.len() + 5);
    put_varint(&mut out, body.len() as i32);
    out.put_slice(&body);
    out
}

fn get_varint(buf: &mut &[u8]) -> Result<i32, SlpError> {
    let mut value: u32 = 0;
    for shift in 0..5 {
        let Some((&byte, rest)) = buf.split_first() else {
            return Err(SlpError::Malformed("truncated varint".into()));
        };
        *buf = rest;
        value |= u32::from(byte & 0x7F) << (7 * shift);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(SlpError::Malformed("varint too long".into()))
}

async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, SlpError> {
    let mut value: u32 = 0;
    for shift in 0..5 {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * shift);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(SlpError::Malformed("varint too long".into()))
}

/// Read one packet, returning its id and payload.
async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(i32, Vec<u8>), SlpError> {
    let len = read_varint(reader).await?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| (1..=MAX_PACKET_LEN).contains(len))
        .ok_or_else(|| SlpError::Malformed(format!("packet length {len} out of range")))?;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    let mut cursor = body.as_slice();
    let id = get_varint(&mut cursor)?;
    Ok((id, cursor.to_vec()))
}

// ── Exchange ──────────────────────────────────────────────────────

/// Handshake and status request. Returns the status and its round trip.
async fn exchange<S>(stream: &mut S, host: &str, port: u16) -> Result<(GameServerStatus, Duration), SlpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = BytesMut::new();
    put_varint(&mut handshake, HANDSHAKE_PROTOCOL);
    put_string(&mut handshake, host);
    handshake.put_u16(port);
    put_varint(&mut handshake, NEXT_STATE_STATUS);

    let requested = Instant::now();
    stream.write_all(&frame(0x00, &handshake)).await?;
    stream.write_all(&frame(0x00, &[])).await?;
    stream.flush().await?;

    let (id, payload) = read_packet(stream).await?;
    if id != 0x00 {
        return Err(SlpError::Malformed(format!("expected status packet, got id {id}")));
    }
    let status_rtt = requested.elapsed();

    let mut cursor = payload.as_slice();
    let json_len = usize::try_from(get_varint(&mut cursor)?)
        .map_err(|_| SlpError::Malformed("negative string length".into()))?;
    let json = cursor
        .get(..json_len)
        .ok_or_else(|| SlpError::Malformed("truncated status string".into()))?;
    let json = std::str::from_utf8(json)
        .map_err(|_| SlpError::Malformed("status is not UTF-8".into()))?;
    Ok((status_from_json(json)?, status_rtt))
}

/// Ping round trip. `None` when the server answers with something other
/// than the matching pong.
async fn ping<S>(stream: &mut S) -> Option<Duration>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match ping_once(stream, rand::random()).await {
        Ok(rtt) => Some(rtt),
        Err(e) => {
            debug!(error = %e, "ping after status failed");
            None
        }
    }
}

async fn ping_once<S>(stream: &mut S, token: i64) -> Result<Duration, SlpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started = Instant::now();
    stream.write_all(&frame(0x01, &token.to_be_bytes())).await?;
    stream.flush().await?;
    let (id, payload) = read_packet(stream).await?;
    if id != 0x01 || payload.as_slice() != token.to_be_bytes() {
        return Err(SlpError::Malformed("pong does not match ping".into()));
    }
    Ok(started.elapsed())
}

/// Prober speaking Server List Ping.
#[derive(Debug, Clone, Default)]
pub struct MinecraftProber;

impl MinecraftProber {
    pub fn new() -> Self {
        Self
    }

    /// Query `address` once, returning the status and latency.
    pub async fn status(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<(GameServerStatus, Duration), ProbeError> {
        let (host, port) = parse_address(address)?;
        let deadline = Instant::now() + timeout;
        match tokio::time::timeout(timeout, self.query(address, &host, port, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::timeout(address, timeout)),
        }
    }

    async fn query(
        &self,
        address: &str,
        host: &str,
        port: u16,
        deadline: Instant,
    ) -> Result<(GameServerStatus, Duration), ProbeError> {
        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| ProbeError::unreachable(address, e))?;
        let (status, status_rtt) = exchange(&mut stream, host, port)
            .await
            .map_err(|e| e.into_probe_error(address))?;

        // The pong gets at most half of what is left, so a server that
        // never answers it still reports its status before the deadline.
        let pong_wait = deadline.saturating_duration_since(Instant::now()) / 2;
        let latency = match tokio::time::timeout(pong_wait, ping(&mut stream)).await {
            Ok(Some(rtt)) => rtt,
            Ok(None) => status_rtt,
            Err(_) => {
                debug!(%address, wait_ms = pong_wait.as_millis() as u64, "no pong, using status round trip");
                status_rtt
            }
        };
        Ok((status, latency))
    }
}

#[async_trait]
impl Prober for MinecraftProber {
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeResult {
        let started = Instant::now();
        match self.status(address, timeout).await {
            Ok((status, latency)) => {
                debug!(
                    %address,
                    online = status.player_count,
                    max = status.max_players,
                    latency_ms = latency.as_millis() as u64,
                    "status ping answered"
                );
                ProbeResult::success(address, latency, ServerInfo::Game(status))
            }
            Err(e) => ProbeResult::failure(address, started.elapsed(), e),
        }
    }
}
