//! Request PDU builders.
//!
//! Each builder writes a complete PDU (function code and body) into the
//! caller's [`Writer`], validating quantities against the limits from the
//! Modbus application protocol specification.

use crate::encoding::Writer;
use crate::pdu::FunctionCode;
use crate::EncodeError;

/// Maximum coils/discrete inputs in a single read.
pub const MAX_READ_BITS: u16 = 2000;
/// Maximum registers in a single read.
pub const MAX_READ_REGISTERS: u16 = 125;
/// Maximum coils in a single multi-write.
pub const MAX_WRITE_COILS: u16 = 1968;
/// Maximum registers in a single multi-write.
pub const MAX_WRITE_REGISTERS: u16 = 123;

fn check_quantity(quantity: u16, max: u16) -> Result<(), EncodeError> {
    if quantity == 0 || quantity > max {
        return Err(EncodeError::ValueOutOfRange);
    }
    Ok(())
}

fn read_request(
    w: &mut Writer<'_>,
    function: FunctionCode,
    address: u16,
    quantity: u16,
    max: u16,
) -> Result<(), EncodeError> {
    check_quantity(quantity, max)?;
    w.write_u8(function.as_u8())?;
    w.write_be_u16(address)?;
    w.write_be_u16(quantity)
}

pub fn read_coils(w: &mut Writer<'_>, address: u16, quantity: u16) -> Result<(), EncodeError> {
    read_request(w, FunctionCode::ReadCoils, address, quantity, MAX_READ_BITS)
}

pub fn read_discrete_inputs(
    w: &mut Writer<'_>,
    address: u16,
    quantity: u16,
) -> Result<(), EncodeError> {
    read_request(
        w,
        FunctionCode::ReadDiscreteInputs,
        address,
        quantity,
        MAX_READ_BITS,
    )
}

pub fn read_holding_registers(
    w: &mut Writer<'_>,
    address: u16,
    quantity: u16,
) -> Result<(), EncodeError> {
    read_request(
        w,
        FunctionCode::ReadHoldingRegisters,
        address,
        quantity,
        MAX_READ_REGISTERS,
    )
}

pub fn read_input_registers(
    w: &mut Writer<'_>,
    address: u16,
    quantity: u16,
) -> Result<(), EncodeError> {
    read_request(
        w,
        FunctionCode::ReadInputRegisters,
        address,
        quantity,
        MAX_READ_REGISTERS,
    )
}

pub fn write_single_coil(w: &mut Writer<'_>, address: u16, on: bool) -> Result<(), EncodeError> {
    w.write_u8(FunctionCode::WriteSingleCoil.as_u8())?;
    w.write_be_u16(address)?;
    w.write_be_u16(if on { 0xFF00 } else { 0x0000 })
}

pub fn write_single_register(
    w: &mut Writer<'_>,
    address: u16,
    value: u16,
) -> Result<(), EncodeError> {
    w.write_u8(FunctionCode::WriteSingleRegister.as_u8())?;
    w.write_be_u16(address)?;
    w.write_be_u16(value)
}

/// Writes `quantity` coils starting at `address`, taken LSB-first from `values`.
pub fn write_multiple_coils(
    w: &mut Writer<'_>,
    address: u16,
    quantity: u16,
    values: &[u8],
) -> Result<(), EncodeError> {
    check_quantity(quantity, MAX_WRITE_COILS)?;
    let byte_count = (quantity as usize + 7) / 8;
    if values.len() < byte_count {
        return Err(EncodeError::InvalidLength);
    }
    w.write_u8(FunctionCode::WriteMultipleCoils.as_u8())?;
    w.write_be_u16(address)?;
    w.write_be_u16(quantity)?;
    w.write_u8(byte_count as u8)?;
    w.write_all(&values[..byte_count])
}

pub fn write_multiple_registers(
    w: &mut Writer<'_>,
    address: u16,
    values: &[u16],
) -> Result<(), EncodeError> {
    if values.len() > usize::from(MAX_WRITE_REGISTERS) {
        return Err(EncodeError::ValueOutOfRange);
    }
    let quantity = values.len() as u16;
    check_quantity(quantity, MAX_WRITE_REGISTERS)?;
    w.write_u8(FunctionCode::WriteMultipleRegisters.as_u8())?;
    w.write_be_u16(address)?;
    w.write_be_u16(quantity)?;
    w.write_u8((values.len() * 2) as u8)?;
    for &value in values {
        w.write_be_u16(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Writer;

    #[test]
    fn read_holding_registers_layout() {
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        read_holding_registers(&mut w, 0x006B, 3).unwrap();
        assert_eq!(w.as_written(), &[0x03, 0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn read_quantity_bounds() {
        let mut buf = [0u8; 8];
        assert_eq!(
            read_coils(&mut Writer::new(&mut buf), 0, 0),
            Err(EncodeError::ValueOutOfRange)
        );
        assert_eq!(
            read_coils(&mut Writer::new(&mut buf), 0, MAX_READ_BITS + 1),
            Err(EncodeError::ValueOutOfRange)
        );
        assert!(read_coils(&mut Writer::new(&mut buf), 0, MAX_READ_BITS).is_ok());
        assert_eq!(
            read_input_registers(&mut Writer::new(&mut buf), 0, MAX_READ_REGISTERS + 1),
            Err(EncodeError::ValueOutOfRange)
        );
    }

    #[test]
    fn write_single_coil_uses_ff00() {
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        write_single_coil(&mut w, 0x00AC, true).unwrap();
        assert_eq!(w.as_written(), &[0x05, 0x00, 0xAC, 0xFF, 0x00]);
    }

    #[test]
    fn write_multiple_coils_packs_bytes() {
        let mut buf = [0u8; 16];
        let mut w = Writer::new(&mut buf);
        write_multiple_coils(&mut w, 0x0013, 10, &[0xCD, 0x01]).unwrap();
        assert_eq!(
            w.as_written(),
            &[0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0xCD, 0x01]
        );
    }

    #[test]
    fn write_multiple_coils_rejects_short_value_slice() {
        let mut buf = [0u8; 16];
        assert_eq!(
            write_multiple_coils(&mut Writer::new(&mut buf), 0, 10, &[0xCD]),
            Err(EncodeError::InvalidLength)
        );
    }

    #[test]
    fn write_multiple_registers_layout() {
        let mut buf = [0u8; 16];
        let mut w = Writer::new(&mut buf);
        write_multiple_registers(&mut w, 0x0001, &[0x000A, 0x0102]).unwrap();
        assert_eq!(
            w.as_written(),
            &[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
    }

    #[test]
    fn write_multiple_registers_rejects_empty() {
        let mut buf = [0u8; 16];
        assert_eq!(
            write_multiple_registers(&mut Writer::new(&mut buf), 0, &[]),
            Err(EncodeError::ValueOutOfRange)
        );
    }

    #[test]
    fn write_multiple_registers_rejects_oversized_slice() {
        let mut buf = [0u8; 256];
        assert_eq!(
            write_multiple_registers(
                &mut Writer::new(&mut buf),
                0,
                &[0u16; MAX_WRITE_REGISTERS as usize + 1]
            ),
            Err(EncodeError::ValueOutOfRange)
        );

        // A length that wraps to a small u16 must not slip past the check.
        let huge = std::vec![0u16; u16::MAX as usize + 1 + MAX_WRITE_REGISTERS as usize];
        assert_eq!(
            write_multiple_registers(&mut Writer::new(&mut buf), 0, &huge),
            Err(EncodeError::ValueOutOfRange)
        );
    }
}
