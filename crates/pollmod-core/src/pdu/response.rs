//! Response PDU parsers.
//!
//! Responses borrow their payload from the framed ADU; accessors decode
//! individual bits/registers on demand instead of copying into owned storage.

use crate::encoding::Reader;
use crate::pdu::{ExceptionCode, ExceptionResponse, FunctionCode};
use crate::DecodeError;

/// Bit-packed payload of a coil or discrete-input read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitsResponse<'a> {
    data: &'a [u8],
}

impl<'a> BitsResponse<'a> {
    fn parse(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let byte_count = r.read_u8()? as usize;
        let data = r.read_exact(byte_count)?;
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(Self { data })
    }

    /// Bit `index` of the response, LSB-first within each byte.
    pub fn bit(&self, index: usize) -> Option<bool> {
        let byte = *self.data.get(index / 8)?;
        Some((byte >> (index % 8)) & 1 == 1)
    }

    pub fn byte_count(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}

/// Big-endian register payload of a holding/input register read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistersResponse<'a> {
    data: &'a [u8],
}

impl<'a> RegistersResponse<'a> {
    fn parse(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let byte_count = r.read_u8()? as usize;
        if byte_count % 2 != 0 {
            return Err(DecodeError::InvalidLength);
        }
        let data = r.read_exact(byte_count)?;
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(Self { data })
    }

    pub fn register_count(&self) -> usize {
        self.data.len() / 2
    }

    pub fn register(&self, index: usize) -> Option<u16> {
        let offset = index.checked_mul(2)?;
        let bytes = self.data.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}

/// Address/value echo returned by the write function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEcho {
    pub address: u16,
    pub value: u16,
}

impl WriteEcho {
    fn parse(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let address = r.read_be_u16()?;
        let value = r.read_be_u16()?;
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(Self { address, value })
    }
}

/// A decoded response PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response<'a> {
    Bits(FunctionCode, BitsResponse<'a>),
    Registers(FunctionCode, RegistersResponse<'a>),
    WriteEcho(FunctionCode, WriteEcho),
    /// A well-formed response for a function code without a dedicated parser.
    Custom(u8, &'a [u8]),
    Exception(ExceptionResponse),
}

impl<'a> Response<'a> {
    /// Decodes a full response PDU (function byte followed by the body).
    pub fn decode(pdu: &'a [u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(pdu);
        let function_byte = r.read_u8()?;
        if function_byte & 0x80 != 0 {
            return Ok(Self::Exception(ExceptionResponse::decode(
                function_byte,
                &mut r,
            )?));
        }
        let function = FunctionCode::from_u8(function_byte)?;
        match function {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                Ok(Self::Bits(function, BitsResponse::parse(&mut r)?))
            }
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                Ok(Self::Registers(function, RegistersResponse::parse(&mut r)?))
            }
            FunctionCode::WriteSingleCoil
            | FunctionCode::WriteSingleRegister
            | FunctionCode::WriteMultipleCoils
            | FunctionCode::WriteMultipleRegisters => {
                Ok(Self::WriteEcho(function, WriteEcho::parse(&mut r)?))
            }
            FunctionCode::Custom(raw) => {
                let rest = r.read_exact(r.remaining())?;
                Ok(Self::Custom(raw, rest))
            }
        }
    }

    pub fn exception_code(&self) -> Option<ExceptionCode> {
        match self {
            Self::Exception(exc) => Some(exc.exception_code),
            _ => None,
        }
    }
}
