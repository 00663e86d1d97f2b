//! Typed builders and parsers for the common Modbus PDUs.

mod exception;
mod function_code;
pub mod request;
mod response;

pub use exception::{ExceptionCode, ExceptionResponse};
pub use function_code::FunctionCode;
pub use response::{BitsResponse, RegistersResponse, Response, WriteEcho};
