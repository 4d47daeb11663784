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
//! Protocol constants shared by the frame builders and decoders

use serde::{Deserialize, Serialize};

/// APDU Class byte of the current Starknet app
pub const CLA: u8 = 0x5A;

/// APDU Class byte of the early boilerplate-derived app
pub const CLA_V1: u8 = 0x80;

/// Class byte reserved for the BOLOS platform commands
pub const CLA_PLATFORM: u8 = 0xB0;

/// Platform instruction returning the running app name and version
pub const INS_PLATFORM_APP_AND_VERSION: u8 = 0x01;

/// Size of the fixed command header (cla, ins, p1, p2, lc)
pub const HEADER_LEN: usize = 5;

/// Largest payload a single frame can carry
pub const MAX_PAYLOAD_LEN: usize = 255;

/// P2 flag set on every legacy envelope frame but the last one
pub const P2_MORE: u8 = 0x80;

/// P2 value of the last legacy envelope frame
pub const P2_LAST: u8 = 0x00;

/// P2 of the first frame of a call
pub const P2_CALL_NEW: u8 = 0x00;

/// P2 of the frames continuing a call
pub const P2_CALL_ADD: u8 = 0x01;

/// Field elements carried by each call or constructor calldata frame
pub const FELTS_PER_FRAME: usize = 7;

/// BIP32 hardened derivation flag
pub const BIP32_HARDENED: u32 = 0x8000_0000;

/// Field element (felt) byte length
pub const FELT_LEN: usize = 32;

/// Public Key Length (uncompressed: format byte, x, y)
pub const PK_LEN: usize = 1 + 2 * FELT_LEN;

/// ECDSA signature length as announced by the device (r, s, v)
pub const SIG_LEN: usize = 2 * FELT_LEN + 1;

/// APDU instruction codes
///
/// Codes are shared between revisions but not their meaning: 0x04 is the
/// Pedersen hash on the V1 app and Invoke V1 signing on the V2 app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionCode {
    /// Get app version
    GetVersion,
    /// Get public key
    GetPublicKey,
    /// Sign a 32 byte hash
    SignHash,
    /// Sign a legacy transaction envelope (V1 only)
    SignTx,
    /// Sign an Invoke V3 transaction (V2 only)
    SignInvokeV3,
    /// Sign an Invoke V1 transaction (V2 only)
    SignInvokeV1,
    /// Sign a DeployAccount V3 transaction (V2 only)
    SignDeployAccountV3,
    /// Sign a DeployAccount V1 transaction (V2 only)
    SignDeployAccountV1,
    /// Pedersen hash (V1 only)
    PedersenHash,
    /// Poseidon hash (V2 only)
    PoseidonHash,
}

impl InstructionCode {
    /// Instruction byte
    pub fn code(self) -> u8 {
        match self {
            InstructionCode::GetVersion => 0x00,
            InstructionCode::GetPublicKey => 0x01,
            InstructionCode::SignHash => 0x02,
            InstructionCode::SignTx | InstructionCode::SignInvokeV3 => 0x03,
            InstructionCode::SignInvokeV1 | InstructionCode::PedersenHash => 0x04,
            InstructionCode::SignDeployAccountV3 => 0x05,
            InstructionCode::SignDeployAccountV1 => 0x06,
            InstructionCode::PoseidonHash => 0x07,
        }
    }
}

/// Protocol revision spoken by the app on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProtocolVersion {
    /// Early app: CLA 0x80, Pedersen hashing, legacy sign-hash parameters
    V1,
    /// Current app: CLA 0x5A, Poseidon hashing
    #[default]
    V2,
}

impl ProtocolVersion {
    /// Class byte of the app commands for this revision
    pub fn cla(self) -> u8 {
        match self {
            ProtocolVersion::V1 => CLA_V1,
            ProtocolVersion::V2 => CLA,
        }
    }

    /// (p1, p2) of the frame carrying the hash in a sign-hash exchange
    pub fn sign_hash_params(self) -> (u8, u8) {
        match self {
            ProtocolVersion::V1 => (0x02, 0x00),
            ProtocolVersion::V2 => (0x01, 0x01),
        }
    }

    /// Whether this revision implements the given instruction
    pub fn supports(self, ins: InstructionCode) -> bool {
        match ins {
            InstructionCode::GetVersion
            | InstructionCode::GetPublicKey
            | InstructionCode::SignHash => true,
            InstructionCode::SignTx | InstructionCode::PedersenHash => self == ProtocolVersion::V1,
            InstructionCode::SignInvokeV3
            | InstructionCode::SignInvokeV1
            | InstructionCode::SignDeployAccountV3
            | InstructionCode::SignDeployAccountV1
            | InstructionCode::PoseidonHash => self == ProtocolVersion::V2,
        }
    }
}

/// Status words returned by the app
pub mod sw {
    /// Success
    pub const OK: u16 = 0x9000;
    /// Request denied by the user (V2)
    pub const DENY: u16 = 0x6E04;
    /// Request denied by the user (V1, ISO "conditions not satisfied")
    pub const DENY_V1: u16 = 0x6985;
    /// Class not supported
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;
    /// Instruction not supported
    pub const INS_NOT_SUPPORTED: u16 = 0x6E01;
    /// Wrong p1 or p2
    pub const WRONG_P1P2: u16 = 0x6E02;
    /// Wrong data length
    pub const WRONG_APDU_LENGTH: u16 = 0x6E03;
    /// Wrong response length
    pub const WRONG_RESPONSE_LENGTH: u16 = 0xB000;
    /// BIP32 path could not be displayed
    pub const DISPLAY_BIP32_PATH_FAIL: u16 = 0xB001;
    /// Address could not be displayed
    pub const DISPLAY_ADDRESS_FAIL: u16 = 0xB002;
    /// Amount could not be displayed
    pub const DISPLAY_AMOUNT_FAIL: u16 = 0xB003;
    /// Wrong transaction length
    pub const WRONG_TX_LENGTH: u16 = 0xB004;
    /// Transaction parsing failed
    pub const TX_PARSING_FAIL: u16 = 0xB005;
    /// Transaction hashing failed
    pub const TX_HASH_FAIL: u16 = 0xB006;
    /// App in a bad state for this command
    pub const BAD_STATE: u16 = 0xB007;
    /// Signing failed
    pub const SIGNATURE_FAIL: u16 = 0xB008;
}
