//! TCP framing: the 7-byte MBAP header followed by the PDU.

use crate::encoding::{Reader, Writer};
use crate::frame::{AduView, PDU_MAX};
use crate::{DecodeError, EncodeError};

/// MBAP header size on the wire.
pub const HEADER_LEN: usize = 7;

/// Largest MBAP frame: header plus the maximum PDU.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + PDU_MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Length covers the unit-id byte plus the PDU.
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_be_u16(self.transaction_id)?;
        w.write_be_u16(self.protocol_id)?;
        w.write_be_u16(self.length)?;
        w.write_u8(self.unit_id)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let transaction_id = r.read_be_u16()?;
        let protocol_id = r.read_be_u16()?;
        let length = r.read_be_u16()?;
        let unit_id = r.read_u8()?;

        if protocol_id != 0 {
            return Err(DecodeError::InvalidValue);
        }
        if length < 1 {
            return Err(DecodeError::InvalidLength);
        }

        Ok(Self {
            transaction_id,
            protocol_id,
            length,
            unit_id,
        })
    }
}

/// Encodes an ADU as an MBAP frame under the given transaction id.
pub fn encode_adu(
    w: &mut Writer<'_>,
    transaction_id: u16,
    adu: &AduView<'_>,
) -> Result<(), EncodeError> {
    if adu.pdu_len() > PDU_MAX {
        return Err(EncodeError::ValueOutOfRange);
    }
    let length = adu.pdu_len() as u16 + 1;

    let header = MbapHeader {
        transaction_id,
        protocol_id: 0,
        length,
        unit_id: adu.unit_id,
    };
    header.encode(w)?;
    w.write_u8(adu.function)?;
    w.write_all(adu.payload)
}

/// Decodes an MBAP frame into its header and ADU view.
pub fn decode_adu<'a>(r: &mut Reader<'a>) -> Result<(MbapHeader, AduView<'a>), DecodeError> {
    let header = MbapHeader::decode(r)?;
    // length == 1 would leave no room for the function code
    if header.length < 2 {
        return Err(DecodeError::InvalidLength);
    }
    let pdu = r.read_exact(usize::from(header.length) - 1)?;
    Ok((header, AduView::new(header.unit_id, pdu[0], &pdu[1..])))
}
