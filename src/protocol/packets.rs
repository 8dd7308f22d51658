//! Encoders for the packets the proxy writes on its own behalf.
//!
//! Title, subtitle and timing packets carry a single length byte rather than
//! a VarInt, so their whole payload must stay within 255 bytes. The transfer
//! packet uses a regular VarInt length.

use crate::common::ProtocolError;
use crate::protocol::varint::{decode_varint, put_varint, varint_len};
use bytes::{BufMut, BytesMut};

/// Zero-length frame the client accepts and ignores.
pub const HEARTBEAT: [u8; 1] = [0x00];

/// Play-state disconnect packet id as sent by the backend.
pub const DISCONNECT_PACKET_ID: u8 = 0x1D;

/// Written to the backend after a successful liveness connect.
pub const PROBE_PAYLOAD: [u8; 8] = [0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01];

pub const TITLE_TIMES_ID: u8 = b'f';
pub const TRANSFER_ID: u8 = b's';

/// Largest payload a single length byte can describe.
pub const MAX_SHORT_PAYLOAD: usize = u8::MAX as usize;

const TAG_END: u8 = 0x00;
const TAG_STRING: u8 = 0x08;
const TAG_COMPOUND: u8 = 0x0A;

/// Which title line a text packet targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSlot {
    Title,
    Subtitle,
}

impl TitleSlot {
    pub fn packet_id(self) -> u8 {
        match self {
            TitleSlot::Title => b'e',
            TitleSlot::Subtitle => b'c',
        }
    }
}

/// Fade-in, stay and fade-out durations in game ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleTimes {
    pub fade_in: u32,
    pub stay: u32,
    pub fade_out: u32,
}

/// Minimal network compound tag holding only named string entries.
struct CompoundTag {
    buf: BytesMut,
}

impl CompoundTag {
    fn new() -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(TAG_COMPOUND);
        Self { buf }
    }

    fn put_string(&mut self, name: &str, value: &str) -> Result<(), ProtocolError> {
        self.buf.put_u8(TAG_STRING);
        put_short_string(&mut self.buf, name)?;
        put_short_string(&mut self.buf, value)
    }

    fn finish(mut self) -> BytesMut {
        self.buf.put_u8(TAG_END);
        self.buf
    }
}

fn put_short_string(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    let len = u16::try_from(s.len()).map_err(|_| ProtocolError::PayloadTooLarge {
        len: s.len(),
        max: u16::MAX as usize,
    })?;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

/// Size of a title packet payload (everything after the length byte).
pub fn title_payload_len(text: &str, color: &str) -> usize {
    // id + compound open + two string entries + end tag
    1 + 1 + (1 + 2 + "color".len() + 2 + color.len()) + (1 + 2 + "text".len() + 2 + text.len()) + 1
}

/// Encode a title or subtitle text packet with a hex `color` such as `#FF5555`.
pub fn title_packet(slot: TitleSlot, text: &str, color: &str) -> Result<Vec<u8>, ProtocolError> {
    let len = title_payload_len(text, color);
    if len > MAX_SHORT_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge {
            len,
            max: MAX_SHORT_PAYLOAD,
        });
    }

    let mut compound = CompoundTag::new();
    compound.put_string("color", color)?;
    compound.put_string("text", text)?;
    let compound = compound.finish();

    let mut out = Vec::with_capacity(1 + len);
    out.put_u8(len as u8);
    out.put_u8(slot.packet_id());
    out.put_slice(&compound);
    Ok(out)
}

pub fn title_times_packet(times: TitleTimes) -> Vec<u8> {
    let mut out = Vec::with_capacity(14);
    out.put_u8(13);
    out.put_u8(TITLE_TIMES_ID);
    out.put_u32(times.fade_in);
    out.put_u32(times.stay);
    out.put_u32(times.fade_out);
    out
}

/// Encode a transfer packet sending the client to `host:port`.
///
/// The length prefix counts the id byte, the host length VarInt, the host
/// bytes and the port VarInt as they are actually encoded.
pub fn transfer_packet(host: &str, port: u16) -> Result<Vec<u8>, ProtocolError> {
    let host_len = u32::try_from(host.len()).map_err(|_| ProtocolError::PayloadTooLarge {
        len: host.len(),
        max: u32::MAX as usize,
    })?;
    let body_len = 1 + varint_len(host_len) + host.len() + varint_len(port as u32);

    let mut out = BytesMut::with_capacity(varint_len(body_len as u32) + body_len);
    put_varint(&mut out, body_len as u32);
    out.put_u8(TRANSFER_ID);
    put_varint(&mut out, host_len);
    out.put_slice(host.as_bytes());
    put_varint(&mut out, port as u32);
    Ok(out.to_vec())
}

/// True when `chunk` starts with a disconnect packet mentioning `marker`.
///
/// An empty marker matches every disconnect packet.
pub fn is_disconnect_frame(chunk: &[u8], marker: &[u8]) -> bool {
    let Ok((body_len, prefix_len)) = decode_varint(chunk, 0) else {
        return false;
    };
    if chunk.get(prefix_len) != Some(&DISCONNECT_PACKET_ID) {
        return false;
    }
    // only the disconnect frame itself, not whatever was read after it
    let end = chunk.len().min(prefix_len + body_len as usize);
    let frame = &chunk[prefix_len..end];
    marker.is_empty() || frame.windows(marker.len()).any(|w| w == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_is_an_empty_frame() {
        assert_eq!(HEARTBEAT, [0x00]);
    }

    #[test]
    fn title_packet_layout() {
        let packet = title_packet(TitleSlot::Title, "Reconnecting", "#FF5555").unwrap();

        let mut expected = vec![0u8];
        expected.push(b'e');
        expected.push(0x0A);
        expected.extend_from_slice(&[0x08, 0x00, 0x05]);
        expected.extend_from_slice(b"color");
        expected.extend_from_slice(&[0x00, 0x07]);
        expected.extend_from_slice(b"#FF5555");
        expected.extend_from_slice(&[0x08, 0x00, 0x04]);
        expected.extend_from_slice(b"text");
        expected.extend_from_slice(&[0x00, 0x0C]);
        expected.extend_from_slice(b"Reconnecting");
        expected.push(0x00);
        expected[0] = (expected.len() - 1) as u8;

        assert_eq!(packet, expected);
        assert_eq!(packet[0] as usize, title_payload_len("Reconnecting", "#FF5555"));
        assert_eq!(packet[0], 41);
    }

    #[test]
    fn subtitle_uses_its_own_id() {
        let packet = title_packet(TitleSlot::Subtitle, "Reconnecting.", "#FF5555").unwrap();
        assert_eq!(packet[1], b'c');
        assert_eq!(packet[0] as usize, packet.len() - 1);
    }

    #[test]
    fn oversized_title_is_rejected() {
        let text = "x".repeat(240);
        let err = title_packet(TitleSlot::Title, &text, "#FFFFFF").unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge { max: 255, .. }));
    }

    #[test]
    fn title_at_the_limit_fits() {
        let color = "#FFFFFF";
        let text = "x".repeat(MAX_SHORT_PAYLOAD - title_payload_len("", color));
        let packet = title_packet(TitleSlot::Title, &text, color).unwrap();
        assert_eq!(packet[0], 255);
        assert_eq!(packet.len(), 256);
    }

    #[test]
    fn title_times_layout() {
        let packet = title_times_packet(TitleTimes {
            fade_in: 10,
            stay: 70_000,
            fade_out: 20,
        });
        assert_eq!(
            packet,
            vec![
                13, b'f', 0, 0, 0, 10, 0x00, 0x01, 0x11, 0x70, 0, 0, 0, 20
            ]
        );
    }

    #[test]
    fn transfer_length_counts_encoded_bytes() {
        let packet = transfer_packet("play.example.com", 25565).unwrap();

        // 's' + host length + 16 host bytes + three byte port
        let body_len = 1 + 1 + 16 + 3;
        assert_eq!(packet[0] as usize, body_len);
        assert_eq!(packet.len(), 1 + body_len);
        assert_eq!(packet[1], b's');
        assert_eq!(packet[2], 16);
        assert_eq!(&packet[3..19], b"play.example.com");
        assert_eq!(&packet[19..], &[0xDD, 0xC7, 0x01]);
    }

    #[test]
    fn transfer_with_small_port() {
        let packet = transfer_packet("a", 80).unwrap();
        assert_eq!(packet, vec![4, b's', 1, b'a', 80]);
    }

    #[test]
    fn detects_marked_disconnect() {
        let mut frame = vec![0x00, DISCONNECT_PACKET_ID];
        frame.extend_from_slice(b"{\"text\":\"Server closed\"}");
        frame[0] = (frame.len() - 1) as u8;

        assert!(is_disconnect_frame(&frame, b"Server closed"));
        assert!(!is_disconnect_frame(&frame, b"Kicked"));
        assert!(is_disconnect_frame(&frame, b""));
    }

    #[test]
    fn ignores_other_packets_carrying_the_marker() {
        let mut frame = vec![0x00, 0x27];
        frame.extend_from_slice(b"Server closed");
        frame[0] = (frame.len() - 1) as u8;
        assert!(!is_disconnect_frame(&frame, b"Server closed"));
        assert!(!is_disconnect_frame(&[], b"Server closed"));
        assert!(!is_disconnect_frame(&[0x05], b""));
    }

    #[test]
    fn marker_in_a_following_frame_does_not_count() {
        let mut kick = vec![0x00, DISCONNECT_PACKET_ID];
        kick.extend_from_slice(b"{\"text\":\"Kicked\"}");
        kick[0] = (kick.len() - 1) as u8;

        let mut chat = vec![0x00, 0x6C];
        chat.extend_from_slice(b"Server closed");
        chat[0] = (chat.len() - 1) as u8;

        let chunk = [kick.clone(), chat].concat();
        assert!(!is_disconnect_frame(&chunk, b"Server closed"));
        assert!(is_disconnect_frame(&chunk, b"Kicked"));
        assert!(is_disconnect_frame(&chunk, b""));
    }

    #[test]
    fn long_disconnect_frames_read_the_id_after_the_prefix() {
        let reason = format!("Server closed {}", "!".repeat(200));
        let mut body = vec![DISCONNECT_PACKET_ID];
        body.extend_from_slice(reason.as_bytes());
        let mut frame = Vec::new();
        put_varint(&mut frame, body.len() as u32);
        frame.extend_from_slice(&body);

        assert_eq!(frame[2], DISCONNECT_PACKET_ID);
        assert!(is_disconnect_frame(&frame, b"Server closed"));
    }
}
