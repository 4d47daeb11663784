/*******************************************************************************
*   (c) 2018, 2019 ZondaX GmbH
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
// Tests against a physical device running the Starknet app

#![deny(warnings, trivial_casts, trivial_numeric_casts)]
#![deny(unused_import_braces, unused_qualifications)]

extern crate ledger_starknet;

use ledger_starknet::{
    Call, CallDataEntry, Config, FieldElement, InvokeV3, ProtocolVersion, StarknetApp, Transaction,
};
use ledger_transport_hid::{hidapi::HidApi, TransportNativeHID};

use once_cell::sync::Lazy;
use serial_test::serial;

static HIDAPI: Lazy<HidApi> = Lazy::new(|| HidApi::new().expect("Failed to create Hidapi"));

const PATH: &str = "m/2645'/1195502025'/1148870696'/0'/0'/0";

const ACCOUNT: &str = "0x07e00d496e324876bbc8531f2d9a82bf154d1a04a50218ee74cdd372f75a551a";
const ETH: &str = "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7";

fn app() -> StarknetApp<TransportNativeHID> {
    StarknetApp::new(TransportNativeHID::new(&HIDAPI).expect("unable to create transport"))
}

fn legacy_app() -> StarknetApp<TransportNativeHID> {
    let config = Config {
        protocol: ProtocolVersion::V1,
        ..Default::default()
    };
    StarknetApp::with_config(
        TransportNativeHID::new(&HIDAPI).expect("unable to create transport"),
        config,
    )
}

#[tokio::test]
#[serial]
#[ignore = "needs a device"]
async fn version() {
    let app = app();

    let version = app.version().await.unwrap();

    println!("major {}", version.major);
    println!("minor {}", version.minor);
    println!("patch {}", version.patch);

    assert!(version.major >= 1);
}

#[tokio::test]
#[serial]
#[ignore = "needs a device"]
async fn device_info() {
    let app = app();

    assert!(app.device_info().await.is_ok());
}

#[tokio::test]
#[serial]
#[ignore = "needs a device"]
async fn app_and_version() {
    let app = app();

    let info = app.app_and_version().await.unwrap();

    println!("app     {}", info.app_name);
    println!("version {}", info.app_version);

    assert_eq!(info.app_name, "Starknet");
}

#[tokio::test]
#[serial]
#[ignore = "needs a device"]
async fn public_key() {
    let app = app();

    let pk = app.public_key(PATH).await.unwrap();

    println!("Public Key x {}", hex::encode(pk.x));
    println!("Public Key y {}", hex::encode(pk.y));

    assert_eq!(pk.format, 0x04);
}

#[tokio::test]
#[serial]
#[ignore = "needs a device and user approval"]
async fn sign_hash() {
    let app = app();

    let hash =
        hex::decode("055b8f28706a5008d3103bcb2bfa6356e56b95c34fed265c955846670a6bb4ef").unwrap();

    let pending = app.sign_hash(PATH, &hash).await.unwrap();
    let signature = pending.resolve().await.unwrap();

    println!("r {}", hex::encode(signature.r));
    println!("s {}", hex::encode(signature.s));
    println!("v {:?}", signature.v);
}

#[tokio::test]
#[serial]
#[ignore = "needs a device and user approval"]
async fn sign_invoke_v3() {
    let app = app();

    let account: FieldElement = ACCOUNT.parse().unwrap();
    let tx = InvokeV3 {
        sender_address: account,
        chain_id: FieldElement::from_short_string("SN_MAIN").unwrap(),
        nonce: FieldElement::from(1),
        calls: vec![Call::new(
            ETH.parse().unwrap(),
            "transfer",
            vec![account, FieldElement::from(1000)],
        )],
        ..Default::default()
    };

    let pending = app.sign_transaction(PATH, &tx.into()).await.unwrap();
    let signature = pending.resolve().await.unwrap();

    println!("hash {}", hex::encode(signature.hash));
    println!("r    {}", hex::encode(signature.signature.r));
    println!("s    {}", hex::encode(signature.signature.s));
}

#[tokio::test]
#[serial]
#[ignore = "needs a device running the early app and user approval"]
async fn sign_tx() {
    let app = legacy_app();

    let tx = Transaction {
        to: ETH.parse().unwrap(),
        selector: "transfer".into(),
        calldata: vec![
            CallDataEntry::new("recipient", ACCOUNT).unwrap(),
            CallDataEntry::new("amount", "1000").unwrap(),
        ],
    };

    let pending = app.sign_tx(PATH, &tx).await.unwrap();
    let signature = pending.resolve().await.unwrap();

    println!("hash {}", hex::encode(signature.hash));
    println!("r    {}", hex::encode(signature.signature.r));
    println!("s    {}", hex::encode(signature.signature.s));
}
