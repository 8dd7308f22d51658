//! Decoding of the first packet a client sends.

use crate::common::{HandshakeInfo, NextState, ProtocolError};
use crate::protocol::frame::FrameReader;
use crate::protocol::varint::{decode_varint, put_varint};
use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::AsyncRead;
use tokio::time::{Duration, Instant, timeout_at};

pub const HANDSHAKE_PACKET_ID: u32 = 0x00;

/// Upper bound on the bytes buffered while waiting for a handshake.
pub const MAX_HANDSHAKE_LEN: usize = 2048;

/// How a freshly accepted connection should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Relay the connection through a full session.
    Session(HandshakeInfo),
    /// Run the bounded status/ping exchange. Carries the handshake when it
    /// decoded but asked for something other than a session.
    Status(Option<HandshakeInfo>),
}

/// Decode the handshake frame at the start of `buf`.
pub fn classify(buf: &[u8]) -> Result<HandshakeInfo, ProtocolError> {
    let (packet_len, mut pos) = decode_varint(buf, 0)?;
    let frame_end = pos + packet_len as usize;
    if frame_end > buf.len() {
        return Err(ProtocolError::MalformedHandshake(format!(
            "frame declares {} bytes, only {} buffered",
            packet_len,
            buf.len() - pos
        )));
    }
    let frame = &buf[..frame_end];

    let (packet_id, n) = decode_varint(frame, pos)?;
    pos += n;
    if packet_id != HANDSHAKE_PACKET_ID {
        return Err(ProtocolError::UnexpectedPacketId(packet_id));
    }

    let (protocol_version, n) = decode_varint(frame, pos)?;
    pos += n;

    let (host_len, n) = decode_varint(frame, pos)?;
    pos += n;
    let host_end = pos + host_len as usize;
    if host_end > frame_end {
        return Err(ProtocolError::MalformedHandshake(
            "hostname runs past the end of the frame".into(),
        ));
    }
    let hostname = std::str::from_utf8(&frame[pos..host_end])
        .map_err(|_| ProtocolError::MalformedHandshake("hostname is not valid UTF-8".into()))?
        .to_string();
    pos = host_end;

    let port_bytes = frame
        .get(pos..pos + 2)
        .ok_or_else(|| ProtocolError::MalformedHandshake("missing port".into()))?;
    let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
    pos += 2;

    let (next_state, _) = decode_varint(frame, pos)?;

    Ok(HandshakeInfo {
        protocol_version,
        hostname,
        port,
        next_state: NextState::from(next_state),
        frame_len: frame_end,
    })
}

/// Pick a route for the bytes read off a new connection.
pub fn route(buf: &[u8]) -> (Route, Option<ProtocolError>) {
    match classify(buf) {
        Ok(info) if info.wants_session() => (Route::Session(info), None),
        Ok(info) => (Route::Status(Some(info)), None),
        Err(e) => (Route::Status(None), Some(e)),
    }
}

/// Read from `reader` until a whole handshake frame is buffered.
///
/// Stops early on EOF, on a frame that can never be valid, once
/// `MAX_HANDSHAKE_LEN` bytes are held, or when `limit` elapses; whatever was
/// read is returned so the caller can still forward it.
pub async fn read_handshake<R: AsyncRead + Unpin>(
    reader: &mut R,
    limit: Duration,
) -> io::Result<BytesMut> {
    let deadline = Instant::now() + limit;
    let mut frames = FrameReader::new(MAX_HANDSHAKE_LEN);

    loop {
        match frames.complete_frame_len() {
            Ok(None) => {}
            Ok(Some(_)) | Err(_) => break,
        }
        if frames.buffered().len() >= MAX_HANDSHAKE_LEN {
            break;
        }
        match timeout_at(deadline, frames.fill(reader)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }

    Ok(frames.into_buffered())
}

/// Encode a handshake packet the way a client sends it.
pub fn handshake_packet(protocol_version: u32, host: &str, port: u16, next_state: NextState) -> Vec<u8> {
    let mut body = BytesMut::new();
    put_varint(&mut body, HANDSHAKE_PACKET_ID);
    put_varint(&mut body, protocol_version);
    put_varint(&mut body, host.len() as u32);
    body.put_slice(host.as_bytes());
    body.put_u16(port);
    put_varint(&mut body, next_state.code());

    let mut out = Vec::with_capacity(body.len() + 2);
    put_varint(&mut out, body.len() as u32);
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn classifies_login_handshake() {
        let packet = handshake_packet(767, "play.example.com", 25565, NextState::Login);
        let info = classify(&packet).unwrap();

        assert_eq!(info.protocol_version, 767);
        assert_eq!(info.hostname, "play.example.com");
        assert_eq!(info.port, 25565);
        assert_eq!(info.next_state, NextState::Login);
        assert_eq!(info.frame_len, packet.len());
        assert!(info.wants_session());
    }

    #[test]
    fn trailing_bytes_are_not_part_of_the_frame() {
        let mut buf = handshake_packet(47, "localhost", 25565, NextState::Status);
        let frame_len = buf.len();
        buf.extend_from_slice(&[0x01, 0x00]);

        let info = classify(&buf).unwrap();
        assert_eq!(info.frame_len, frame_len);
        assert_eq!(info.next_state, NextState::Status);
    }

    #[test]
    fn truncated_buffer_is_invalid() {
        let packet = handshake_packet(767, "play.example.com", 25565, NextState::Login);
        for cut in [0, 1, 5, packet.len() - 1] {
            assert!(classify(&packet[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn wrong_packet_id_is_invalid() {
        let mut packet = handshake_packet(767, "a", 1, NextState::Login);
        packet[1] = 0x05;
        assert_eq!(classify(&packet), Err(ProtocolError::UnexpectedPacketId(5)));
    }

    #[test]
    fn non_utf8_hostname_is_invalid() {
        let mut packet = handshake_packet(767, "ab", 25565, NextState::Login);
        // length, id, two byte protocol version, host length, then host
        packet[5] = 0xFF;
        assert!(matches!(
            classify(&packet),
            Err(ProtocolError::MalformedHandshake(_))
        ));
    }

    #[test]
    fn hostname_longer_than_frame_is_invalid() {
        let mut packet = handshake_packet(767, "ab", 25565, NextState::Login);
        packet[4] = 0x40;
        assert!(matches!(
            classify(&packet),
            Err(ProtocolError::MalformedHandshake(_))
        ));
    }

    #[test]
    fn routes_by_next_state() {
        let login = handshake_packet(767, "h", 1, NextState::Login);
        let transfer = handshake_packet(767, "h", 1, NextState::Transfer);
        let status = handshake_packet(767, "h", 1, NextState::Status);

        assert!(matches!(route(&login), (Route::Session(_), None)));
        assert!(matches!(route(&transfer), (Route::Session(_), None)));
        assert!(matches!(route(&status), (Route::Status(Some(_)), None)));
        assert!(matches!(route(&[0xFE, 0x01]), (Route::Status(None), Some(_))));
    }

    #[tokio::test]
    async fn buffers_a_handshake_split_over_reads() {
        let packet = handshake_packet(767, "play.example.com", 25565, NextState::Login);
        let (mut tx, mut rx) = tokio::io::duplex(256);
        let (head, tail) = packet.split_at(7);
        let (head, tail) = (head.to_vec(), tail.to_vec());
        tokio::spawn(async move {
            tx.write_all(&head).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.write_all(&tail).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let buf = read_handshake(&mut rx, Duration::from_secs(2)).await.unwrap();
        assert_eq!(&buf[..], &packet[..]);
        assert_eq!(classify(&buf).unwrap().hostname, "play.example.com");
    }

    #[tokio::test]
    async fn returns_partial_bytes_when_the_client_stalls() {
        let (mut tx, mut rx) = tokio::io::duplex(256);
        tx.write_all(&[0x10, 0x00]).await.unwrap();

        let buf = read_handshake(&mut rx, Duration::from_millis(50)).await.unwrap();
        assert_eq!(&buf[..], &[0x10, 0x00]);
        assert!(classify(&buf).is_err());
        drop(tx);
    }
}
