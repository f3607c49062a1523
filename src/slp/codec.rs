// Minecraft protocol framing: VarInt, length-prefixed strings, packets.

use tokio::io::{AsyncRead, AsyncReadExt};

use super::SlpError;

/// VarInts never exceed five bytes.
const VARINT_MAX_BYTES: usize = 5;

/// Upper bound on a status JSON payload we are willing to buffer.
pub const MAX_STATUS_LEN: usize = 1 << 20;

pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7F == 0 {
            buf.push(v as u8);
            return;
        }
        buf.push(((v & 0x7F) | 0x80) as u8);
        v >>= 7;
    }
}

pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

pub async fn read_varint<R: AsyncRead + Unpin>(r: &mut R) -> Result<i32, SlpError> {
    let mut result: u32 = 0;
    for i in 0..VARINT_MAX_BYTES {
        let byte = r.read_u8().await?;
        result |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result as i32);
        }
    }
    Err(SlpError::Protocol("VarInt too long".into()))
}

/// Prefixes `body` (packet id + fields) with its VarInt length.
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + VARINT_MAX_BYTES);
    write_varint(&mut out, body.len() as i32);
    out.extend_from_slice(body);
    out
}

/// Handshake (id 0x00) announcing the status state (next state 1).
pub fn handshake_packet(host: &str, port: u16, protocol_version: i32) -> Vec<u8> {
    let mut body = Vec::with_capacity(host.len() + 16);
    write_varint(&mut body, 0x00);
    write_varint(&mut body, protocol_version);
    write_string(&mut body, host);
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut body, 1);
    frame(&body)
}

/// Status request: empty packet with id 0x00.
pub fn status_request_packet() -> Vec<u8> {
    frame(&[0x00])
}

/// Reads one status response packet and returns its JSON string.
pub async fn read_status_response<R: AsyncRead + Unpin>(r: &mut R) -> Result<String, SlpError> {
    let packet_len = read_varint(r).await?;
    if packet_len <= 0 {
        return Err(SlpError::Protocol(format!("bad packet length {packet_len}")));
    }
    let packet_id = read_varint(r).await?;
    if packet_id != 0x00 {
        return Err(SlpError::Protocol(format!(
            "unexpected packet id {packet_id:#04x}"
        )));
    }
    let json_len = read_varint(r).await?;
    let json_len = usize::try_from(json_len)
        .map_err(|_| SlpError::Protocol(format!("negative string length {json_len}")))?;
    if json_len > MAX_STATUS_LEN {
        return Err(SlpError::Protocol(format!(
            "status payload too large ({json_len} bytes)"
        )));
    }
    let mut data = vec![0u8; json_len];
    r.read_exact(&mut data).await?;
    String::from_utf8(data).map_err(|e| SlpError::Protocol(format!("status not UTF-8: {e}")))
}
