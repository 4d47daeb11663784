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
//! Command frames and the per-operation frame builders

use ledger_transport::APDUCommand;

use crate::account_tx::{
    require_empty, AccountTransaction, Call, DeployAccountV1, DeployAccountV3, InvokeV1, InvokeV3,
};
use crate::chunk::{self, chunkify};
use crate::errors::BuildError;
use crate::params::{
    InstructionCode, ProtocolVersion, CLA, CLA_PLATFORM, CLA_V1, FELTS_PER_FRAME, FELT_LEN,
    HEADER_LEN, INS_PLATFORM_APP_AND_VERSION, MAX_PAYLOAD_LEN, P2_CALL_ADD, P2_CALL_NEW,
};
use crate::path::BIP32Path;
use crate::transaction::{FieldElement, Transaction};

/// A complete command: 5 byte header plus a payload of at most 255 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    payload: Vec<u8>,
}

impl Frame {
    /// Build a frame, rejecting payloads the length byte cannot describe
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, payload: Vec<u8>) -> Result<Self, BuildError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(BuildError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Frame {
            cla,
            ins,
            p1,
            p2,
            payload,
        })
    }

    fn header_only(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Frame {
            cla,
            ins,
            p1,
            p2,
            payload: Vec::new(),
        }
    }

    /// Class byte
    pub fn cla(&self) -> u8 {
        self.cla
    }

    /// Instruction byte
    pub fn ins(&self) -> u8 {
        self.ins
    }

    /// First parameter byte
    pub fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter byte
    pub fn p2(&self) -> u8 {
        self.p2
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Value of the length byte
    pub fn payload_len(&self) -> u8 {
        // bounded by Frame::new
        self.payload.len() as u8
    }

    /// Total size on the wire
    pub fn len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Always false: a frame carries at least its header
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Wire bytes: `[cla][ins][p1][p2][len][payload]`
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2, self.payload_len()]);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Transport command for this frame
    pub fn command(&self) -> APDUCommand<Vec<u8>> {
        self.clone().into()
    }
}

impl From<Frame> for APDUCommand<Vec<u8>> {
    fn from(frame: Frame) -> Self {
        APDUCommand {
            cla: frame.cla,
            ins: frame.ins,
            p1: frame.p1,
            p2: frame.p2,
            data: frame.payload,
        }
    }
}

/// Platform command returning the running app name and version
pub fn get_app_and_version() -> Frame {
    Frame::header_only(CLA_PLATFORM, INS_PLATFORM_APP_AND_VERSION, 0x00, 0x00)
}

/// App version query
pub fn get_version(protocol: ProtocolVersion) -> Frame {
    Frame::header_only(protocol.cla(), InstructionCode::GetVersion.code(), 0x00, 0x00)
}

/// Public key query, `display` asks the device to show it for confirmation
pub fn get_public_key(
    protocol: ProtocolVersion,
    path: &BIP32Path,
    display: bool,
) -> Result<Frame, BuildError> {
    let p1 = if display { 0x01 } else { 0x00 };
    Frame::new(
        protocol.cla(),
        InstructionCode::GetPublicKey.code(),
        p1,
        0x00,
        path.serialize(),
    )
}

/// Two frames: the derivation path, then the hash to sign
pub fn sign_hash(
    protocol: ProtocolVersion,
    path: &BIP32Path,
    hash: &[u8],
) -> Result<Vec<Frame>, BuildError> {
    let ins = InstructionCode::SignHash.code();
    let (p1, p2) = protocol.sign_hash_params();

    Ok(vec![
        Frame::new(protocol.cla(), ins, 0x00, 0x00, path.serialize())?,
        Frame::new(protocol.cla(), ins, p1, p2, hash.to_vec())?,
    ])
}

/// Legacy transaction envelope frames (V1 app), sequence-numbered in p1
pub fn sign_tx(path: &BIP32Path, tx: &Transaction) -> Result<Vec<Frame>, BuildError> {
    let segments = tx.segments(path)?;
    chunk::sequence_frames(CLA_V1, InstructionCode::SignTx.code(), &segments)
}

fn felts_payload<'a>(felts: impl IntoIterator<Item = &'a FieldElement>) -> Vec<u8> {
    felts.into_iter().flat_map(|f| f.to_bytes_be()).collect()
}

/// Step-numbered frames of one account transaction, all under one instruction
struct Steps {
    ins: u8,
    frames: Vec<Frame>,
}

impl Steps {
    fn new(ins: InstructionCode, path: &BIP32Path) -> Result<Self, BuildError> {
        let ins = ins.code();
        let frames = vec![Frame::new(CLA, ins, 0x00, 0x00, path.serialize())?];
        Ok(Steps { ins, frames })
    }

    fn next_step(&self) -> u8 {
        // every step but the calldata ones adds one frame
        self.frames.last().map_or(0, |f| f.p1() + 1)
    }

    fn push(&mut self, payload: Vec<u8>) -> Result<&mut Self, BuildError> {
        let frame = Frame::new(CLA, self.ins, self.next_step(), 0x00, payload)?;
        self.frames.push(frame);
        Ok(self)
    }

    fn push_felts(&mut self, felts: &[FieldElement]) -> Result<&mut Self, BuildError> {
        self.push(felts_payload(felts))
    }

    /// `FELTS_PER_FRAME` elements per frame, all frames sharing `p1`
    fn push_chunked(
        &mut self,
        p1: u8,
        felts: &[FieldElement],
        p2_first: u8,
        p2_next: u8,
    ) -> Result<&mut Self, BuildError> {
        let bytes = felts_payload(felts);
        for (idx, chunk) in chunkify(&bytes, FELTS_PER_FRAME * FELT_LEN)
            .into_iter()
            .enumerate()
        {
            let p2 = if idx == 0 { p2_first } else { p2_next };
            let frame = Frame::new(CLA, self.ins, p1, p2, chunk.payload.to_vec())?;
            self.frames.push(frame);
        }
        Ok(self)
    }

    /// Calls count, then each call: first frame flagged new, the rest continued
    fn push_calls(&mut self, calls: &[Call]) -> Result<&mut Self, BuildError> {
        self.push_felts(&[FieldElement::from(calls.len() as u64)])?;
        let p1 = self.next_step();
        for call in calls {
            self.push_chunked(p1, &call.felts(), P2_CALL_NEW, P2_CALL_ADD)?;
        }
        Ok(self)
    }

    /// Calldata length, then the calldata itself (an empty frame if there is none)
    fn push_constructor_calldata(&mut self, calldata: &[FieldElement]) -> Result<&mut Self, BuildError> {
        self.push_felts(&[FieldElement::from(calldata.len() as u64)])?;
        let p1 = self.next_step();
        self.push_chunked(p1, calldata, 0x00, 0x00)
    }

    fn finish(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }
}

fn invoke_v3(path: &BIP32Path, tx: &InvokeV3) -> Result<Vec<Frame>, BuildError> {
    require_empty("paymaster data", &tx.paymaster_data)?;
    require_empty("account deployment data", &tx.account_deployment_data)?;

    let mut fields = Vec::with_capacity(7 * FELT_LEN);
    fields.extend(tx.sender_address.to_bytes_be());
    fields.extend(tx.tip.to_bytes_be());
    fields.extend(tx.resource_bounds.l1_gas_bytes());
    fields.extend(tx.resource_bounds.l2_gas_bytes());
    fields.extend(felts_payload(&[tx.chain_id, tx.nonce, tx.data_availability_mode]));

    Ok(Steps::new(InstructionCode::SignInvokeV3, path)?
        .push(fields)?
        .push(Vec::new())?
        .push(Vec::new())?
        .push_calls(&tx.calls)?
        .finish())
}

fn invoke_v1(path: &BIP32Path, tx: &InvokeV1) -> Result<Vec<Frame>, BuildError> {
    Ok(Steps::new(InstructionCode::SignInvokeV1, path)?
        .push_felts(&[tx.sender_address, tx.max_fee, tx.chain_id, tx.nonce])?
        .push_calls(&tx.calls)?
        .finish())
}

fn deploy_account_v3(path: &BIP32Path, tx: &DeployAccountV3) -> Result<Vec<Frame>, BuildError> {
    require_empty("paymaster data", &tx.paymaster_data)?;

    let mut fees = Vec::with_capacity(3 * FELT_LEN);
    fees.extend(tx.tip.to_bytes_be());
    fees.extend(tx.resource_bounds.l1_gas_bytes());
    fees.extend(tx.resource_bounds.l2_gas_bytes());

    Ok(Steps::new(InstructionCode::SignDeployAccountV3, path)?
        .push_felts(&[
            tx.contract_address,
            tx.chain_id,
            tx.nonce,
            tx.data_availability_mode,
            tx.class_hash,
            tx.contract_address_salt,
        ])?
        .push(fees)?
        .push(Vec::new())?
        .push_constructor_calldata(&tx.constructor_calldata)?
        .finish())
}

fn deploy_account_v1(path: &BIP32Path, tx: &DeployAccountV1) -> Result<Vec<Frame>, BuildError> {
    Ok(Steps::new(InstructionCode::SignDeployAccountV1, path)?
        .push_felts(&[
            tx.contract_address,
            tx.class_hash,
            tx.contract_address_salt,
            tx.max_fee,
            tx.chain_id,
            tx.nonce,
        ])?
        .push_felts(&[tx.max_fee])?
        .push_constructor_calldata(&tx.constructor_calldata)?
        .finish())
}

/// Account transaction frames (V2 app).
///
/// p1 numbers the steps: the derivation path first, then the transaction
/// fields, fees and data lists for the kind, then the calls or the
/// constructor calldata. Calls and calldata are sent seven elements per
/// frame, every frame of a list sharing the list's step number.
pub fn sign_account_tx(path: &BIP32Path, tx: &AccountTransaction) -> Result<Vec<Frame>, BuildError> {
    match tx {
        AccountTransaction::InvokeV3(tx) => invoke_v3(path, tx),
        AccountTransaction::InvokeV1(tx) => invoke_v1(path, tx),
        AccountTransaction::DeployAccountV3(tx) => deploy_account_v3(path, tx),
        AccountTransaction::DeployAccountV1(tx) => deploy_account_v1(path, tx),
    }
}

/// Pedersen hash of two elements (V1 app)
pub fn pedersen(
    a: &FieldElement,
    b: &FieldElement,
    count: u8,
    variant: u8,
) -> Result<Frame, BuildError> {
    Frame::new(
        CLA_V1,
        InstructionCode::PedersenHash.code(),
        count,
        variant,
        felts_payload([a, b]),
    )
}

/// Poseidon hash input (V2 app)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoseidonInput {
    /// Hash of a single element
    Single(FieldElement),
    /// Hash of a pair of elements
    Pair(FieldElement, FieldElement),
}

/// Poseidon hash request (V2 app)
pub fn poseidon(input: &PoseidonInput) -> Result<Frame, BuildError> {
    let (p1, payload) = match input {
        PoseidonInput::Single(x) => (0x00, felts_payload([x])),
        PoseidonInput::Pair(x, y) => (0x01, felts_payload([x, y])),
    };
    Frame::new(
        CLA,
        InstructionCode::PoseidonHash.code(),
        p1,
        0x00,
        payload,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn starknet_path() -> BIP32Path {
        "m/2645'/1195502025'/1148870696'/0'/0'/0".parse().unwrap()
    }

    fn felt(s: &str) -> FieldElement {
        s.parse().unwrap()
    }

    const ACCOUNT: &str = "0x07e00d496e324876bbc8531f2d9a82bf154d1a04a50218ee74cdd372f75a551a";
    const ETH: &str = "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7";

    fn eth_transfer() -> InvokeV3 {
        InvokeV3 {
            sender_address: felt(ACCOUNT),
            chain_id: FieldElement::from_short_string("SN_MAIN").unwrap(),
            nonce: FieldElement::from(1),
            calls: vec![Call::new(
                felt(ETH),
                "transfer",
                vec![felt(ACCOUNT), FieldElement::from(1000)],
            )],
            ..Default::default()
        }
    }

    fn wire(frames: &[Frame]) -> Vec<String> {
        frames.iter().map(|f| hex::encode(f.serialize())).collect()
    }

    #[test]
    fn version_frame() {
        let frame = get_version(ProtocolVersion::V2);
        assert_eq!(hex::encode(frame.serialize()), "5a00000000");
        assert_eq!(frame.len(), 5);
    }

    #[test]
    fn app_and_version_frame() {
        assert_eq!(hex::encode(get_app_and_version().serialize()), "b001000000");
    }

    #[test]
    fn frame_length_invariant() {
        for len in 0..=MAX_PAYLOAD_LEN {
            let frame = Frame::new(0x5A, 0x03, 0x00, 0x00, vec![0xAB; len]).unwrap();
            let wire = frame.serialize();
            assert_eq!(wire[4] as usize, len);
            assert_eq!(wire.len(), HEADER_LEN + len);
            assert_eq!(frame.len(), wire.len());
        }
        assert_eq!(
            Frame::new(0x5A, 0x03, 0x00, 0x00, vec![0; 256]),
            Err(BuildError::PayloadTooLarge { len: 256, max: 255 })
        );
    }

    #[test]
    fn public_key_frame() {
        let frame = get_public_key(ProtocolVersion::V2, &starknet_path(), false).unwrap();
        assert_eq!(
            hex::encode(frame.serialize()),
            "5a0100001880000a55c741e9c9c47a6028800000008000000000000000"
        );

        let frame = get_public_key(ProtocolVersion::V2, &starknet_path(), true).unwrap();
        assert_eq!(frame.p1(), 0x01);
    }

    #[test]
    fn sign_hash_frames() {
        let hash = [0x11u8; 32];
        let frames = sign_hash(ProtocolVersion::V2, &starknet_path(), &hash).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!((frames[0].p1(), frames[0].p2()), (0x00, 0x00));
        assert_eq!(frames[0].payload(), starknet_path().serialize().as_slice());
        assert_eq!((frames[1].p1(), frames[1].p2()), (0x01, 0x01));
        assert_eq!(frames[1].payload(), &hash);

        let frames = sign_hash(ProtocolVersion::V1, &starknet_path(), &hash).unwrap();
        assert_eq!(frames[0].cla(), 0x80);
        assert_eq!((frames[1].p1(), frames[1].p2()), (0x02, 0x00));
    }

    #[test]
    fn builders_leave_input_untouched() {
        let hash = vec![0x22u8; 32];
        let before = hash.clone();
        let _ = sign_hash(ProtocolVersion::V2, &starknet_path(), &hash).unwrap();
        assert_eq!(hash, before);
    }

    #[test]
    fn pedersen_frame() {
        let a: FieldElement = "0x1".parse().unwrap();
        let b: FieldElement = "2".parse().unwrap();
        let frame = pedersen(&a, &b, 2, 0).unwrap();
        assert_eq!(frame.cla(), 0x80);
        assert_eq!(frame.ins(), 0x04);
        assert_eq!(frame.p1(), 2);
        assert_eq!(frame.payload_len(), 64);
        assert_eq!(frame.payload()[31], 1);
        assert_eq!(frame.payload()[63], 2);
    }

    #[test]
    fn poseidon_frames() {
        let x: FieldElement = "0x7".parse().unwrap();
        let frame = poseidon(&PoseidonInput::Single(x)).unwrap();
        assert_eq!((frame.ins(), frame.p1(), frame.payload_len()), (0x07, 0x00, 32));

        let frame = poseidon(&PoseidonInput::Pair(x, x)).unwrap();
        assert_eq!((frame.p1(), frame.payload_len()), (0x01, 64));
    }

    #[test]
    fn invoke_v3_frames() {
        let tx = AccountTransaction::from(eth_transfer());
        let frames = sign_account_tx(&starknet_path(), &tx).unwrap();

        let zero = "00".repeat(32);
        let fields = format!(
            "{}{zero}{}{}{}{}{zero}",
            &ACCOUNT[2..],
            format!("00004c315f474153{}", "00".repeat(24)),
            format!("00004c325f474153{}", "00".repeat(24)),
            format!("{}534e5f4d41494e", "00".repeat(25)),
            format!("{}01", "00".repeat(31)),
        );
        let call = format!(
            "{}{}{}{}03e8",
            &ETH[2..],
            "0083afd3f4caedc6eebf44246fe54e38c95e3179a5ec9ea81740eca5b482d12e",
            &ACCOUNT[2..],
            "00".repeat(30),
        );

        assert_eq!(
            wire(&frames),
            vec![
                "5a0300001880000a55c741e9c9c47a6028800000008000000000000000".to_string(),
                format!("5a030100e0{fields}"),
                "5a03020000".to_string(),
                "5a03030000".to_string(),
                format!("5a03040020{}01", "00".repeat(31)),
                format!("5a03050080{call}"),
            ]
        );
    }

    #[test]
    fn long_call_is_continued() {
        let mut tx = eth_transfer();
        // to + selector + 13 = 15 elements: 7 + 7 + 1
        tx.calls[0].calldata = (0..13).map(FieldElement::from).collect();
        tx.calls.push(Call::new(felt(ETH), "approve", vec![]));

        let frames = sign_account_tx(&starknet_path(), &tx.into()).unwrap();
        let calls: Vec<_> = frames[5..]
            .iter()
            .map(|f| (f.p1(), f.p2(), f.payload().len() / 32))
            .collect();
        assert_eq!(
            calls,
            vec![(5, 0x00, 7), (5, 0x01, 7), (5, 0x01, 1), (5, 0x00, 2)]
        );
        assert_eq!(frames[4].payload()[31], 2);
    }

    #[test]
    fn invoke_v1_frames() {
        let tx = InvokeV1 {
            sender_address: felt(ACCOUNT),
            max_fee: FieldElement::from(0x1234),
            chain_id: FieldElement::from_short_string("SN_SEPOLIA").unwrap(),
            nonce: FieldElement::from(3),
            calls: eth_transfer().calls,
        };
        let frames = sign_account_tx(&starknet_path(), &tx.into()).unwrap();

        let header: Vec<_> = frames
            .iter()
            .map(|f| (f.cla(), f.ins(), f.p1(), f.p2(), f.payload().len()))
            .collect();
        assert_eq!(
            header,
            vec![
                (0x5A, 0x04, 0, 0, 24),
                (0x5A, 0x04, 1, 0, 128),
                (0x5A, 0x04, 2, 0, 32),
                (0x5A, 0x04, 3, 0, 128),
            ]
        );
        assert_eq!(&frames[1].payload()[32..64], &FieldElement::from(0x1234).to_bytes_be());
    }

    #[test]
    fn deploy_account_v3_frames() {
        let tx = DeployAccountV3 {
            contract_address: felt(ACCOUNT),
            class_hash: FieldElement::from(0xc1a55),
            contract_address_salt: FieldElement::from(0x5a17),
            constructor_calldata: (0..9).map(FieldElement::from).collect(),
            tip: FieldElement::from(2),
            chain_id: FieldElement::from_short_string("SN_MAIN").unwrap(),
            nonce: FieldElement::ZERO,
            ..Default::default()
        };
        let frames = sign_account_tx(&starknet_path(), &tx.into()).unwrap();

        let header: Vec<_> = frames
            .iter()
            .map(|f| (f.ins(), f.p1(), f.p2(), f.payload().len() / 32))
            .collect();
        assert_eq!(
            header,
            vec![
                (0x05, 0, 0, 0),
                (0x05, 1, 0, 6),
                (0x05, 2, 0, 3),
                (0x05, 3, 0, 0),
                (0x05, 4, 0, 1),
                (0x05, 5, 0, 7),
                (0x05, 5, 0, 2),
            ]
        );
        assert_eq!(frames[1].payload()[32 * 4 + 31], 0x55);
        assert_eq!(frames[2].payload()[31], 2);
        assert_eq!(&frames[2].payload()[34..40], b"L1_GAS");
        assert_eq!(frames[4].payload()[31], 9);
    }

    #[test]
    fn deploy_account_v1_frames() {
        let tx = DeployAccountV1 {
            contract_address: felt(ACCOUNT),
            max_fee: FieldElement::from(0xfee),
            ..Default::default()
        };
        let frames = sign_account_tx(&starknet_path(), &tx.into()).unwrap();

        let header: Vec<_> = frames
            .iter()
            .map(|f| (f.ins(), f.p1(), f.payload().len() / 32))
            .collect();
        // no constructor arguments still ends with an empty calldata frame
        assert_eq!(
            header,
            vec![(0x06, 0, 0), (0x06, 1, 6), (0x06, 2, 1), (0x06, 3, 1), (0x06, 4, 0)]
        );
        assert_eq!(&frames[1].payload()[96..128], &FieldElement::from(0xfee).to_bytes_be());
        assert_eq!(frames[2].payload(), &FieldElement::from(0xfee).to_bytes_be());
        assert_eq!(frames[3].payload()[31], 0);
    }

    #[test]
    fn unsupported_lists_are_rejected() {
        let mut tx = eth_transfer();
        tx.paymaster_data = vec![FieldElement::from(1)];
        assert_eq!(
            sign_account_tx(&starknet_path(), &tx.into()),
            Err(BuildError::NotEmpty {
                field: "paymaster data",
                len: 1
            })
        );

        let mut tx = eth_transfer();
        tx.account_deployment_data = vec![FieldElement::from(1); 2];
        assert!(matches!(
            sign_account_tx(&starknet_path(), &tx.into()),
            Err(BuildError::NotEmpty {
                field: "account deployment data",
                ..
            })
        ));
    }

    #[test]
    fn legacy_envelope_frames() {
        let tx = Transaction {
            to: felt(ETH),
            selector: "transfer".into(),
            calldata: vec![
                crate::CallDataEntry::new("recipient", ACCOUNT).unwrap(),
                crate::CallDataEntry::new("amount", "1000").unwrap(),
            ],
        };
        let frames = sign_tx(&starknet_path(), &tx).unwrap();

        // path, call, then exactly one frame per declared entry
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[1].payload().last(), Some(&2));
        assert!(frames.iter().all(|f| f.cla() == 0x80 && f.ins() == 0x03));
        let p1: Vec<_> = frames.iter().map(|f| f.p1()).collect();
        assert_eq!(p1, vec![0, 1, 2, 3]);
    }

    #[test]
    fn command_conversion() {
        let frame = get_public_key(ProtocolVersion::V2, &starknet_path(), false).unwrap();
        let command = frame.command();
        assert_eq!(command.cla, 0x5A);
        assert_eq!(command.ins, 0x01);
        assert_eq!(command.data, frame.payload());
    }
}
