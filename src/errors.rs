/*******************************************************************************
*   (c) 2020 ZondaX GmbH
*
*  Licensed under the Apache License, Version 2.0 (the "License");
*  you may not use this file except in compliance with the License.
*  You may obtain a copy of the License at
*
*      http://www.apache.org/licenses/LICENSE-2.0
*
*  Unless required by applicable law or agreed to in writing, software
*  distributed under the License is distributed on an "AS IS" BASIS,
*  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
*  See the License for the specific language governing permissions and
*  limitations under the License.
********************************************************************************/
//! Error types and status word mapping

use std::fmt::{Debug, Display};

use crate::params::{sw, ProtocolVersion};

/// Logical operation a frame belongs to, carried in errors for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// Platform get-app-and-version
    GetAppAndVersion,
    /// App version
    GetVersion,
    /// Public key retrieval
    GetPublicKey,
    /// Two-step hash signing
    SignHash,
    /// Legacy transaction envelope signing
    SignTx,
    /// Invoke V3 signing
    SignInvokeV3,
    /// Invoke V1 signing
    SignInvokeV1,
    /// DeployAccount V3 signing
    SignDeployAccountV3,
    /// DeployAccount V1 signing
    SignDeployAccountV1,
    /// Pedersen hash
    PedersenHash,
    /// Poseidon hash
    PoseidonHash,
}

/// Structured condition for a non-success status word
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// Class byte rejected
    #[error("class not supported")]
    ClaNotSupported,
    /// Instruction byte rejected
    #[error("instruction not supported")]
    InsNotSupported,
    /// p1/p2 rejected
    #[error("wrong p1/p2 parameters")]
    WrongP1P2,
    /// Command length rejected
    #[error("wrong command length")]
    WrongApduLength,
    /// Response would not fit
    #[error("wrong response length")]
    WrongResponseLength,
    /// BIP32 path display failed
    #[error("failed to display BIP32 path")]
    DisplayBip32PathFail,
    /// Address display failed
    #[error("failed to display address")]
    DisplayAddressFail,
    /// Amount display failed
    #[error("failed to display amount")]
    DisplayAmountFail,
    /// Transaction length rejected
    #[error("wrong transaction length")]
    WrongTxLength,
    /// Transaction could not be parsed
    #[error("transaction parsing failed")]
    TxParsingFail,
    /// Transaction could not be hashed
    #[error("transaction hashing failed")]
    TxHashFail,
    /// Command arrived out of sequence
    #[error("app is in a bad state")]
    BadState,
    /// Signing failed on the device
    #[error("signature failed")]
    SignatureFail,
    /// The user rejected the request on screen
    #[error("denied by the user")]
    UserDenied,
    /// Any other status word
    #[error("unknown status word 0x{0:04X}")]
    UnknownStatus(u16),
}

impl DeviceError {
    /// Map a non-success status word for the given protocol revision
    pub fn from_status(status: u16, protocol: ProtocolVersion) -> Self {
        match status {
            sw::CLA_NOT_SUPPORTED => DeviceError::ClaNotSupported,
            sw::INS_NOT_SUPPORTED => DeviceError::InsNotSupported,
            sw::WRONG_P1P2 => DeviceError::WrongP1P2,
            sw::WRONG_APDU_LENGTH => DeviceError::WrongApduLength,
            sw::DENY => DeviceError::UserDenied,
            sw::DENY_V1 if protocol == ProtocolVersion::V1 => DeviceError::UserDenied,
            sw::WRONG_RESPONSE_LENGTH => DeviceError::WrongResponseLength,
            sw::DISPLAY_BIP32_PATH_FAIL => DeviceError::DisplayBip32PathFail,
            sw::DISPLAY_ADDRESS_FAIL => DeviceError::DisplayAddressFail,
            sw::DISPLAY_AMOUNT_FAIL => DeviceError::DisplayAmountFail,
            sw::WRONG_TX_LENGTH => DeviceError::WrongTxLength,
            sw::TX_PARSING_FAIL => DeviceError::TxParsingFail,
            sw::TX_HASH_FAIL => DeviceError::TxHashFail,
            sw::BAD_STATE => DeviceError::BadState,
            sw::SIGNATURE_FAIL => DeviceError::SignatureFail,
            other => DeviceError::UnknownStatus(other),
        }
    }
}

/// Malformed or wrong-length reply payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes left than the field needs
    #[error("truncated buffer: needed {needed} bytes, {remaining} left")]
    TruncatedBuffer {
        /// Bytes required by the field
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },
    /// Bytes left over after the last field
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    /// Fixed-size reply of the wrong size
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected reply length
        expected: usize,
        /// Actual reply length
        actual: usize,
    },
    /// Announced length does not match the data that follows
    #[error("announced length {announced} does not match {actual} bytes")]
    LengthMismatch {
        /// Length byte as sent by the device
        announced: usize,
        /// Bytes actually present
        actual: usize,
    },
    /// String field is not ASCII
    #[error("field is not valid ASCII")]
    InvalidAscii,
    /// 32 byte value is not below the field prime
    #[error("0x{0} is not a field element")]
    InvalidFieldElement(String),
}

/// Unparseable derivation path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Nothing to parse
    #[error("empty derivation path")]
    Empty,
    /// Segment is not a non-negative integer with an optional apostrophe
    #[error("invalid path segment '{0}'")]
    InvalidSegment(String),
    /// Segment does not fit in 31 bits
    #[error("path segment '{0}' is out of range (bigger than 0x7FFF_FFFF)")]
    OutOfRange(String),
}

/// Request rejected locally before any transmission
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// Invalid derivation path
    #[error(transparent)]
    Path(#[from] PathError),
    /// Payload does not fit a single frame
    #[error("payload of {len} bytes exceeds the {max} bytes frame limit")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Frame limit
        max: usize,
    },
    /// A length-prefixed field is too long for its length byte or frame
    #[error("{field} is too long ({len} bytes, at most {max})")]
    FieldTooLong {
        /// Field name
        field: &'static str,
        /// Field length
        len: usize,
        /// Maximum length
        max: usize,
    },
    /// More frames than the sequence byte can number
    #[error("{0} frames exceed the 256 frames sequence limit")]
    TooManyFrames(usize),
    /// Nothing to send
    #[error("empty frame sequence")]
    NoFrames,
    /// Field element text could not be parsed or is not below the field prime
    #[error("invalid field element '{0}'")]
    InvalidFieldElement(String),
    /// Field the app does not support yet was filled in
    #[error("{field} must be empty, got {len} elements")]
    NotEmpty {
        /// Field name
        field: &'static str,
        /// Number of elements given
        len: usize,
    },
    /// Calldata name is not ASCII
    #[error("calldata name '{0}' is not ASCII")]
    NonAsciiName(String),
}

/// Ledger App Error
#[derive(Debug, thiserror::Error)]
pub enum Error<E: Display + Debug> {
    /// Transport I/O failure
    #[error("Transport error: {0}")]
    Transport(E),

    /// Device answered with a non-success status word
    #[error("{operation} failed at frame {frame} with status 0x{status:04X}: {kind}")]
    Status {
        /// Operation being performed
        operation: Operation,
        /// Index of the frame that produced the status
        frame: usize,
        /// Raw status word
        status: u16,
        /// Mapped condition
        kind: DeviceError,
    },

    /// Reply payload could not be decoded
    #[error("invalid {operation} response: {source}")]
    Decode {
        /// Operation being performed
        operation: Operation,
        /// Decoder failure
        source: DecodeError,
    },

    /// Invalid derivation path
    #[error("invalid derivation path: {0}")]
    Path(PathError),

    /// Request could not be framed
    #[error("invalid request: {0}")]
    Build(BuildError),

    /// Operation not implemented by the selected protocol revision
    #[error("{operation} is not supported by protocol {protocol}")]
    Unsupported {
        /// Operation requested
        operation: Operation,
        /// Selected revision
        protocol: ProtocolVersion,
    },

    /// Device did not answer in time
    #[error("Timeout waiting for device response")]
    RequestTimeout,

    /// User did not act on the device in time
    #[error("Timeout waiting for user interaction")]
    UserTimeout,

    /// Exchange task ended without a reply
    #[error("exchange was cancelled before the device answered")]
    Cancelled,
}

impl<E: Display + Debug> Error<E> {
    /// True when the user rejected the request on the device
    pub fn is_user_denied(&self) -> bool {
        matches!(
            self,
            Error::Status {
                kind: DeviceError::UserDenied,
                ..
            }
        )
    }

    /// Mapped device condition, if the failure came from a status word
    pub fn device_error(&self) -> Option<DeviceError> {
        match self {
            Error::Status { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl<E: Display + Debug> From<BuildError> for Error<E> {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::Path(p) => Error::Path(p),
            other => Error::Build(other),
        }
    }
}

impl<E: Display + Debug> From<PathError> for Error<E> {
    fn from(e: PathError) -> Self {
        Error::Path(e)
    }
}
