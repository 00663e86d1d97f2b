//! ASCII framing: `':' | hex pairs of unit/function/payload/lrc | CR LF`.

use crate::encoding::{hex_digit_value, Writer};
use crate::frame::{AduView, PAYLOAD_MAX, PDU_MAX};
use crate::{DecodeError, EncodeError};

/// Start-of-frame delimiter.
pub const START: u8 = b':';

/// Largest ASCII frame: hex pairs for unit id, PDU and LRC plus delimiters.
pub const MAX_FRAME_LEN: usize = ((PDU_MAX + 3) * 2) + 4;

/// Longitudinal redundancy check: two's complement of the byte sum.
pub fn lrc(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    sum.wrapping_neg()
}

/// Encodes an ADU as an ASCII frame with uppercase hex digits.
pub fn encode_adu(w: &mut Writer<'_>, adu: &AduView<'_>) -> Result<(), EncodeError> {
    if adu.payload.len() > PAYLOAD_MAX {
        return Err(EncodeError::ValueOutOfRange);
    }

    w.write_u8(START)?;
    w.write_hex_u8(adu.unit_id)?;
    w.write_hex_u8(adu.function)?;

    let mut sum = adu.unit_id.wrapping_add(adu.function);
    for byte in adu.payload {
        w.write_hex_u8(*byte)?;
        sum = sum.wrapping_add(*byte);
    }

    w.write_hex_u8(sum.wrapping_neg())?;
    w.write_all(b"\r\n")
}

/// Decodes an ASCII frame, validating the delimiters and the LRC.
///
/// The hex payload is expanded into `payload_buf`; the returned view borrows
/// from that scratch buffer, not from `bytes`.
pub fn decode_adu<'a>(
    bytes: &[u8],
    payload_buf: &'a mut [u8],
) -> Result<AduView<'a>, DecodeError> {
    if bytes.len() < 3 || bytes[0] != START {
        return Err(DecodeError::InvalidDelimiter);
    }
    if !bytes.ends_with(b"\r\n") {
        return Err(DecodeError::InvalidDelimiter);
    }

    let hex = &bytes[1..bytes.len() - 2];
    if hex.len() % 2 != 0 {
        return Err(DecodeError::InvalidLength);
    }
    let decoded_len = hex.len() / 2;
    // unit id + function + LRC at minimum
    if decoded_len < 3 {
        return Err(DecodeError::InvalidLength);
    }
    let payload_len = decoded_len - 3;
    if payload_len > PAYLOAD_MAX || payload_len > payload_buf.len() {
        return Err(DecodeError::InvalidLength);
    }

    let mut sum = 0u8;
    let mut unit_id = 0u8;
    let mut function = 0u8;
    for i in 0..decoded_len {
        let hi = hex_digit_value(hex[2 * i])?;
        let lo = hex_digit_value(hex[2 * i + 1])?;
        let byte = (hi << 4) | lo;

        if i + 1 == decoded_len {
            if byte != sum.wrapping_neg() {
                return Err(DecodeError::InvalidCrc);
            }
            break;
        }

        sum = sum.wrapping_add(byte);
        match i {
            0 => unit_id = byte,
            1 => function = byte,
            _ => payload_buf[i - 2] = byte,
        }
    }

    Ok(AduView::new(unit_id, function, &payload_buf[..payload_len]))
}
