//! APDU framing over fixed-size HID reports.
//!
//! Every report starts with a 5-byte header: channel (u16, big endian), the
//! APDU tag `0x05` and a sequence index (u16, big endian). The first report
//! of a message also carries the total APDU length (u16, big endian) before
//! the payload. Reports are zero-padded to the packet size.

use crate::{Result, TransportError};
use bytes::Bytes;
use devlink_core::constants::HID_TAG_APDU;

const HEADER_LEN: usize = 5;
const LENGTH_LEN: usize = 2;

/// Split an APDU into zero-padded HID reports.
///
/// # Errors
///
/// Returns an error if the APDU is longer than a u16 length prefix allows or
/// the packet size cannot hold a header.
pub fn wrap_apdu(channel: u16, apdu: &[u8], packet_size: usize) -> Result<Vec<Vec<u8>>> {
    if packet_size <= HEADER_LEN + LENGTH_LEN {
        return Err(TransportError::communication(format!(
            "packet size {packet_size} is too small"
        )));
    }
    let length = u16::try_from(apdu.len()).map_err(|_| {
        TransportError::communication(format!("APDU of {} bytes is too long", apdu.len()))
    })?;

    let mut payload = Vec::with_capacity(apdu.len() + LENGTH_LEN);
    payload.extend_from_slice(&length.to_be_bytes());
    payload.extend_from_slice(apdu);

    let chunk_size = packet_size - HEADER_LEN;
    let packets = payload
        .chunks(chunk_size)
        .enumerate()
        .map(|(sequence, chunk)| {
            let mut packet = Vec::with_capacity(packet_size);
            packet.extend_from_slice(&channel.to_be_bytes());
            packet.push(HID_TAG_APDU);
            // Bounded by the u16 payload length divided by a chunk size > 2.
            packet.extend_from_slice(&(sequence as u16).to_be_bytes());
            packet.extend_from_slice(chunk);
            packet.resize(packet_size, 0);
            packet
        })
        .collect();

    Ok(packets)
}

/// Reassembles a reply from HID reports.
#[derive(Debug)]
pub struct Unwrapper {
    channel: u16,
    sequence: u16,
    expected: Option<usize>,
    data: Vec<u8>,
}

impl Unwrapper {
    pub fn new(channel: u16) -> Self {
        Self {
            channel,
            sequence: 0,
            expected: None,
            data: Vec::new(),
        }
    }

    /// Feed one report. Returns the full reply once the last report arrived.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if the report does not belong to this
    /// exchange or arrives out of order.
    pub fn push(&mut self, packet: &[u8]) -> Result<Option<Bytes>> {
        if packet.len() < HEADER_LEN {
            return Err(TransportError::invalid_response("short HID report"));
        }

        let channel = u16::from_be_bytes([packet[0], packet[1]]);
        if channel != self.channel {
            return Err(TransportError::invalid_response(format!(
                "unexpected channel {channel:#06x}"
            )));
        }
        if packet[2] != HID_TAG_APDU {
            return Err(TransportError::invalid_response(format!(
                "unexpected tag {:#04x}",
                packet[2]
            )));
        }
        let sequence = u16::from_be_bytes([packet[3], packet[4]]);
        if sequence != self.sequence {
            return Err(TransportError::invalid_response(format!(
                "expected sequence {}, got {sequence}",
                self.sequence
            )));
        }

        let mut body = &packet[HEADER_LEN..];
        let expected = match self.expected {
            Some(expected) => expected,
            None => {
                if body.len() < LENGTH_LEN {
                    return Err(TransportError::invalid_response("missing reply length"));
                }
                let expected = usize::from(u16::from_be_bytes([body[0], body[1]]));
                body = &body[LENGTH_LEN..];
                self.expected = Some(expected);
                expected
            }
        };

        let remaining = expected - self.data.len();
        self.data.extend_from_slice(&body[..body.len().min(remaining)]);
        self.sequence = self.sequence.wrapping_add(1);

        if self.data.len() == expected {
            Ok(Some(Bytes::from(std::mem::take(&mut self.data))))
        } else {
            Ok(None)
        }
    }
}
