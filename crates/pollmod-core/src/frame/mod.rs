//! ADU views and the three Modbus wire formats.

pub mod ascii;
pub mod rtu;
pub mod tcp;

/// Maximum Modbus PDU size (function code + payload).
pub const PDU_MAX: usize = 253;

/// Maximum ADU payload, i.e. PDU bytes after the function code.
pub const PAYLOAD_MAX: usize = PDU_MAX - 1;

/// A borrowed window over one Application Data Unit.
///
/// An `AduView` never owns its payload: decoders hand out views into the
/// buffer that holds the frame, and the view is only valid as long as that
/// buffer is. Consumers that need to keep the payload must copy it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AduView<'a> {
    pub unit_id: u8,
    pub function: u8,
    pub payload: &'a [u8],
}

impl<'a> AduView<'a> {
    pub const fn new(unit_id: u8, function: u8, payload: &'a [u8]) -> Self {
        Self {
            unit_id,
            function,
            payload,
        }
    }

    /// PDU length: function code plus payload.
    pub const fn pdu_len(&self) -> usize {
        1 + self.payload.len()
    }

    /// True when the function code carries the exception bit.
    pub const fn is_exception(&self) -> bool {
        (self.function & 0x80) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::AduView;

    #[test]
    fn exception_bit_is_detected() {
        let ok = AduView::new(1, 0x03, &[]);
        let exc = AduView::new(1, 0x83, &[0x02]);
        assert!(!ok.is_exception());
        assert!(exc.is_exception());
        assert_eq!(exc.pdu_len(), 2);
    }
}
