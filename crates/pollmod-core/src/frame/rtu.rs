//! RTU framing: `unit_id | function | payload | crc16_lo | crc16_hi`.

use crate::encoding::Writer;
use crate::frame::{AduView, PAYLOAD_MAX};
use crate::{DecodeError, EncodeError};

/// Smallest valid RTU frame: unit id, function code and the CRC trailer.
pub const MIN_FRAME_LEN: usize = 4;

/// Largest RTU frame: unit id + maximum PDU + CRC trailer.
pub const MAX_FRAME_LEN: usize = 256;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC16_TABLE: [u16; 256] = build_crc16_table();

/// Modbus CRC16 (polynomial 0xA001, initial value 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for byte in data {
        let idx = usize::from((crc ^ u16::from(*byte)) & 0x00FF);
        crc = (crc >> 8) ^ CRC16_TABLE[idx];
    }
    crc
}

/// Encodes an ADU as an RTU frame, appending the little-endian CRC.
pub fn encode_adu(w: &mut Writer<'_>, adu: &AduView<'_>) -> Result<(), EncodeError> {
    if adu.payload.len() > PAYLOAD_MAX {
        return Err(EncodeError::ValueOutOfRange);
    }

    let start = w.position();
    w.write_u8(adu.unit_id)?;
    w.write_u8(adu.function)?;
    w.write_all(adu.payload)?;
    let crc = crc16(&w.as_written()[start..]);
    w.write_le_u16(crc)
}

/// Decodes an RTU frame, validating the CRC trailer.
///
/// The returned view borrows the payload directly from `bytes`.
pub fn decode_adu(bytes: &[u8]) -> Result<AduView<'_>, DecodeError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(DecodeError::InvalidLength);
    }

    let (body, trailer) = bytes.split_at(bytes.len() - 2);
    let expected = crc16(body);
    let received = u16::from_le_bytes([trailer[0], trailer[1]]);
    if expected != received {
        return Err(DecodeError::InvalidCrc);
    }

    let payload = &body[2..];
    if payload.len() > PAYLOAD_MAX {
        return Err(DecodeError::InvalidLength);
    }

    Ok(AduView::new(body[0], body[1], payload))
}

#[cfg(test)]
mod tests {
    use super::{crc16, decode_adu, encode_adu, MIN_FRAME_LEN};
    use crate::encoding::Writer;
    use crate::frame::AduView;
    use crate::DecodeError;

    #[test]
    fn crc16_known_vector() {
        let frame_wo_crc = [0x01u8, 0x03, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16(&frame_wo_crc), 0xCDC5);
    }

    #[test]
    fn rtu_roundtrip() {
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        let adu = AduView::new(0x11, 0x03, &[0x00, 0x6B, 0x00, 0x03]);
        encode_adu(&mut w, &adu).unwrap();

        let decoded = decode_adu(w.as_written()).unwrap();
        assert_eq!(decoded.unit_id, 0x11);
        assert_eq!(decoded.function, 0x03);
        assert_eq!(decoded.payload, &[0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn empty_payload_roundtrip() {
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        encode_adu(&mut w, &AduView::new(0x01, 0x07, &[])).unwrap();
        assert_eq!(w.as_written().len(), MIN_FRAME_LEN);

        let decoded = decode_adu(w.as_written()).unwrap();
        assert_eq!(decoded.function, 0x07);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn detects_bad_crc() {
        let bad = [0x11u8, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x00, 0x00];
        assert_eq!(decode_adu(&bad).unwrap_err(), DecodeError::InvalidCrc);
    }

    #[test]
    fn rejects_truncated_frame() {
        assert_eq!(
            decode_adu(&[0x11, 0x03, 0x00]).unwrap_err(),
            DecodeError::InvalidLength
        );
    }
}
