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
//! Account transactions understood by the current app: Invoke and
//! DeployAccount, each in its V3 (resource bounds) and V1 (max fee) form.
//!
//! Every kind has its own instruction and is sent as a list of steps, the
//! step number going in p1. See [`crate::frame::sign_account_tx`].

use sha3::{Digest, Keccak256};

use crate::errors::{BuildError, Operation};
use crate::params::{InstructionCode, FELT_LEN};
use crate::transaction::FieldElement;

const DEFAULT_ENTRY_POINT_NAME: &str = "__default__";
const DEFAULT_L1_ENTRY_POINT_NAME: &str = "__l1_default__";

/// Entry point selector: keccak256 of the name, truncated to 250 bits.
///
/// The default entry points map to zero.
pub fn selector_from_name(name: &str) -> FieldElement {
    if name == DEFAULT_ENTRY_POINT_NAME || name == DEFAULT_L1_ENTRY_POINT_NAME {
        return FieldElement::ZERO;
    }

    let digest = Keccak256::digest(name.as_bytes());
    let mut hash = [0u8; FELT_LEN];
    hash.copy_from_slice(&digest);
    hash[0] &= 0x03;
    // 250 bits are always below the prime
    FieldElement::from_bytes_be(&hash).unwrap_or_default()
}

/// Limits on one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceBound {
    /// Max amount of the resource
    pub max_amount: u64,
    /// Max price per unit
    pub max_price_per_unit: u128,
}

impl ResourceBound {
    /// `name (right-aligned in 8 bytes) || max_amount (8) || max_price_per_unit (16)`
    fn encode(&self, name: &[u8]) -> [u8; FELT_LEN] {
        let mut out = [0u8; FELT_LEN];
        out[8 - name.len()..8].copy_from_slice(name);
        out[8..16].copy_from_slice(&self.max_amount.to_be_bytes());
        out[16..].copy_from_slice(&self.max_price_per_unit.to_be_bytes());
        out
    }
}

/// L1 and L2 gas limits of a V3 transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceBounds {
    /// L1 gas
    pub l1_gas: ResourceBound,
    /// L2 gas
    pub l2_gas: ResourceBound,
}

impl ResourceBounds {
    pub(crate) fn l1_gas_bytes(&self) -> [u8; FELT_LEN] {
        self.l1_gas.encode(b"L1_GAS")
    }

    pub(crate) fn l2_gas_bytes(&self) -> [u8; FELT_LEN] {
        self.l2_gas.encode(b"L2_GAS")
    }
}

/// One contract call of a multicall
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Contract address
    pub to: FieldElement,
    /// Entry point selector
    pub selector: FieldElement,
    /// Raw calldata
    pub calldata: Vec<FieldElement>,
}

impl Call {
    /// Call `entrypoint` on `to`
    pub fn new(to: FieldElement, entrypoint: &str, calldata: Vec<FieldElement>) -> Self {
        Call {
            to,
            selector: selector_from_name(entrypoint),
            calldata,
        }
    }

    /// `to || selector || calldata...`
    pub(crate) fn felts(&self) -> Vec<FieldElement> {
        let mut out = Vec::with_capacity(2 + self.calldata.len());
        out.push(self.to);
        out.push(self.selector);
        out.extend_from_slice(&self.calldata);
        out
    }
}

/// Invoke transaction, version 3
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeV3 {
    /// Account sending the transaction
    pub sender_address: FieldElement,
    /// Tip
    pub tip: FieldElement,
    /// Gas limits
    pub resource_bounds: ResourceBounds,
    /// Paymaster data, must be empty
    pub paymaster_data: Vec<FieldElement>,
    /// Chain id, e.g. `SN_MAIN` as a short string
    pub chain_id: FieldElement,
    /// Account nonce
    pub nonce: FieldElement,
    /// Nonce and fee data availability modes
    pub data_availability_mode: FieldElement,
    /// Account deployment data, must be empty
    pub account_deployment_data: Vec<FieldElement>,
    /// Calls to perform
    pub calls: Vec<Call>,
}

/// Invoke transaction, version 1
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeV1 {
    /// Account sending the transaction
    pub sender_address: FieldElement,
    /// Max fee
    pub max_fee: FieldElement,
    /// Chain id
    pub chain_id: FieldElement,
    /// Account nonce
    pub nonce: FieldElement,
    /// Calls to perform
    pub calls: Vec<Call>,
}

/// DeployAccount transaction, version 3
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployAccountV3 {
    /// Address of the account being deployed
    pub contract_address: FieldElement,
    /// Account class hash
    pub class_hash: FieldElement,
    /// Address salt
    pub contract_address_salt: FieldElement,
    /// Constructor arguments
    pub constructor_calldata: Vec<FieldElement>,
    /// Tip
    pub tip: FieldElement,
    /// Gas limits
    pub resource_bounds: ResourceBounds,
    /// Paymaster data, must be empty
    pub paymaster_data: Vec<FieldElement>,
    /// Chain id
    pub chain_id: FieldElement,
    /// Account nonce
    pub nonce: FieldElement,
    /// Nonce and fee data availability modes
    pub data_availability_mode: FieldElement,
}

/// DeployAccount transaction, version 1
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployAccountV1 {
    /// Address of the account being deployed
    pub contract_address: FieldElement,
    /// Account class hash
    pub class_hash: FieldElement,
    /// Address salt
    pub contract_address_salt: FieldElement,
    /// Constructor arguments
    pub constructor_calldata: Vec<FieldElement>,
    /// Max fee
    pub max_fee: FieldElement,
    /// Chain id
    pub chain_id: FieldElement,
    /// Account nonce
    pub nonce: FieldElement,
}

/// Any account transaction the current app can sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountTransaction {
    /// Invoke V3
    InvokeV3(InvokeV3),
    /// Invoke V1
    InvokeV1(InvokeV1),
    /// DeployAccount V3
    DeployAccountV3(DeployAccountV3),
    /// DeployAccount V1
    DeployAccountV1(DeployAccountV1),
}

impl AccountTransaction {
    /// Instruction carrying this kind
    pub fn instruction(&self) -> InstructionCode {
        match self {
            AccountTransaction::InvokeV3(_) => InstructionCode::SignInvokeV3,
            AccountTransaction::InvokeV1(_) => InstructionCode::SignInvokeV1,
            AccountTransaction::DeployAccountV3(_) => InstructionCode::SignDeployAccountV3,
            AccountTransaction::DeployAccountV1(_) => InstructionCode::SignDeployAccountV1,
        }
    }

    /// Operation reported in errors
    pub fn operation(&self) -> Operation {
        match self {
            AccountTransaction::InvokeV3(_) => Operation::SignInvokeV3,
            AccountTransaction::InvokeV1(_) => Operation::SignInvokeV1,
            AccountTransaction::DeployAccountV3(_) => Operation::SignDeployAccountV3,
            AccountTransaction::DeployAccountV1(_) => Operation::SignDeployAccountV1,
        }
    }
}

impl From<InvokeV3> for AccountTransaction {
    fn from(tx: InvokeV3) -> Self {
        AccountTransaction::InvokeV3(tx)
    }
}

impl From<InvokeV1> for AccountTransaction {
    fn from(tx: InvokeV1) -> Self {
        AccountTransaction::InvokeV1(tx)
    }
}

impl From<DeployAccountV3> for AccountTransaction {
    fn from(tx: DeployAccountV3) -> Self {
        AccountTransaction::DeployAccountV3(tx)
    }
}

impl From<DeployAccountV1> for AccountTransaction {
    fn from(tx: DeployAccountV1) -> Self {
        AccountTransaction::DeployAccountV1(tx)
    }
}

pub(crate) fn require_empty(field: &'static str, data: &[FieldElement]) -> Result<(), BuildError> {
    if data.is_empty() {
        Ok(())
    } else {
        Err(BuildError::NotEmpty {
            field,
            len: data.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_selectors() {
        assert_eq!(
            selector_from_name("transfer").to_string(),
            "0x0083afd3f4caedc6eebf44246fe54e38c95e3179a5ec9ea81740eca5b482d12e"
        );
        assert_eq!(selector_from_name("__default__"), FieldElement::ZERO);
        assert_eq!(selector_from_name("__l1_default__"), FieldElement::ZERO);
    }

    #[test]
    fn selector_fits_250_bits() {
        for name in ["approve", "increase_balance", "execute", "a", ""] {
            assert!(selector_from_name(name).to_bytes_be()[0] <= 0x03, "{name}");
        }
    }

    #[test]
    fn resource_bound_layout() {
        let bounds = ResourceBounds {
            l1_gas: ResourceBound {
                max_amount: 0x2710,
                max_price_per_unit: 0x0102,
            },
            l2_gas: ResourceBound::default(),
        };

        let l1 = bounds.l1_gas_bytes();
        assert_eq!(&l1[..8], b"\0\0L1_GAS");
        assert_eq!(&l1[8..16], &0x2710u64.to_be_bytes());
        assert_eq!(&l1[30..], &[0x01, 0x02]);

        assert_eq!(
            hex::encode(bounds.l2_gas_bytes()),
            format!("00004c325f474153{}", "00".repeat(24))
        );
    }

    #[test]
    fn call_felts_start_with_target_and_selector() {
        let call = Call::new(FieldElement::from(9), "transfer", vec![FieldElement::from(1)]);
        let felts = call.felts();
        assert_eq!(felts.len(), 3);
        assert_eq!(felts[0], FieldElement::from(9));
        assert_eq!(felts[1], selector_from_name("transfer"));
    }

    #[test]
    fn kind_routing() {
        let tx: AccountTransaction = InvokeV1::default().into();
        assert_eq!(tx.instruction().code(), 0x04);
        assert_eq!(tx.operation(), Operation::SignInvokeV1);

        let tx: AccountTransaction = DeployAccountV3::default().into();
        assert_eq!(tx.instruction().code(), 0x05);
    }
}
