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
//! Support library for Starknet Ledger Nano S/X apps

#![deny(warnings, trivial_casts, trivial_numeric_casts)]
#![deny(unused_import_braces, unused_qualifications)]
#![deny(missing_docs)]
#![doc(html_root_url = "https://docs.rs/ledger-starknet/0.3.0")]

use std::fmt::{Debug, Display};

use ledger_transport::Exchange;
use ledger_zondax_generic::{App, AppExt, DeviceInfo, LedgerAppError};
use log::debug;

pub mod account_tx;
pub mod chunk;
pub mod codec;
mod config;
mod errors;
pub mod exchange;
pub mod frame;
pub mod params;
mod path;
pub mod response;
pub mod transaction;

pub use account_tx::{
    selector_from_name, AccountTransaction, Call, DeployAccountV1, DeployAccountV3, InvokeV1,
    InvokeV3, ResourceBound, ResourceBounds,
};
pub use config::Config;
pub use errors::{BuildError, DecodeError, DeviceError, Error, Operation, PathError};
pub use exchange::{ExchangeController, ExchangeState, PendingExchange, PendingResponse, Reply};
pub use frame::{Frame, PoseidonInput};
pub use params::ProtocolVersion;
pub use path::BIP32Path;
pub use response::{AppInfo, DecodeMode, PublicKey, Signature, TxSignature, Version};
pub use transaction::{CallDataEntry, FieldElement, Transaction};

use params::{InstructionCode, CLA};

/// Starknet App
pub struct StarknetApp<E> {
    controller: ExchangeController<E>,
    config: Config,
}

impl<E> App for StarknetApp<E> {
    const CLA: u8 = CLA;
}

impl<E> StarknetApp<E>
where
    E: Exchange + Send + Sync + 'static,
    E::Error: Display + Debug + Send + 'static,
{
    /// Connect to the Ledger App with the default configuration
    pub fn new(transport: E) -> Self {
        Self::with_config(transport, Config::default())
    }

    /// Connect to the Ledger App
    pub fn with_config(transport: E, config: Config) -> Self {
        let controller = ExchangeController::new(transport, config.protocol)
            .with_request_timeout(config.request_timeout())
            .with_user_timeout(config.user_timeout());
        StarknetApp { controller, config }
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Underlying exchange controller
    pub fn controller(&self) -> &ExchangeController<E> {
        &self.controller
    }

    fn require(&self, ins: InstructionCode, operation: Operation) -> Result<(), Error<E::Error>> {
        let protocol = self.config.protocol;
        if protocol.supports(ins) {
            Ok(())
        } else {
            Err(Error::Unsupported {
                operation,
                protocol,
            })
        }
    }

    /// Retrieve the device firmware information (platform command)
    pub async fn device_info(&self) -> Result<DeviceInfo, LedgerAppError<E::Error>>
    where
        E::Error: std::error::Error,
    {
        let link = self.controller.acquire().await;
        Self::get_device_info(&*link).await
    }

    /// Retrieve the name and version of the running app
    pub async fn app_and_version(&self) -> Result<AppInfo, Error<E::Error>> {
        let operation = Operation::GetAppAndVersion;
        let reply = self
            .controller
            .send(operation, &frame::get_app_and_version())
            .await?;
        response::decode_app_and_version(&reply.data)
            .map_err(|source| Error::Decode { operation, source })
    }

    /// Retrieve the app version
    pub async fn version(&self) -> Result<Version, Error<E::Error>> {
        let operation = Operation::GetVersion;
        let reply = self
            .controller
            .send(operation, &frame::get_version(self.config.protocol))
            .await?;
        response::decode_version(&reply.data).map_err(|source| Error::Decode { operation, source })
    }

    /// Retrieves the public key without user confirmation
    pub async fn public_key(&self, path: &str) -> Result<PublicKey, Error<E::Error>> {
        let operation = Operation::GetPublicKey;
        let path: BIP32Path = path.parse()?;
        debug!("Requesting public key for {}", path);

        let command = frame::get_public_key(self.config.protocol, &path, false)?;
        let reply = self.controller.send(operation, &command).await?;
        response::decode_public_key(&reply.data)
            .map_err(|source| Error::Decode { operation, source })
    }

    /// Shows the public key on the device; resolves once the user confirms
    pub async fn public_key_with_confirmation(
        &self,
        path: &str,
    ) -> Result<PendingResponse<PublicKey, E::Error>, Error<E::Error>> {
        let operation = Operation::GetPublicKey;
        let path: BIP32Path = path.parse()?;
        debug!("Requesting confirmed public key for {}", path);

        let command = frame::get_public_key(self.config.protocol, &path, true)?;
        let pending = self.controller.send_async(operation, vec![command]).await?;
        Ok(PendingResponse::new(pending, response::decode_public_key))
    }

    /// Sign a hash; resolves once the user approves or denies it
    pub async fn sign_hash(
        &self,
        path: &str,
        hash: &[u8],
    ) -> Result<PendingResponse<Signature, E::Error>, Error<E::Error>> {
        let operation = Operation::SignHash;
        let path: BIP32Path = path.parse()?;
        debug!("Signing hash with {}", path);

        let frames = frame::sign_hash(self.config.protocol, &path, hash)?;
        let mode = self.config.signature_decoding;
        let pending = self.controller.send_async(operation, frames).await?;
        Ok(PendingResponse::new(pending, move |buf| {
            response::decode_signature(buf, mode)
        }))
    }

    /// Sign a legacy transaction envelope (V1 app); resolves once the user
    /// approves or denies it
    pub async fn sign_tx(
        &self,
        path: &str,
        tx: &Transaction,
    ) -> Result<PendingResponse<TxSignature, E::Error>, Error<E::Error>> {
        let operation = Operation::SignTx;
        self.require(InstructionCode::SignTx, operation)?;
        let path: BIP32Path = path.parse()?;

        let frames = frame::sign_tx(&path, tx)?;
        debug!(
            "Signing call to {} ({}) with {} in {} frames",
            tx.to,
            tx.selector,
            path,
            frames.len()
        );

        let mode = self.config.signature_decoding;
        let pending = self.controller.send_async(operation, frames).await?;
        Ok(PendingResponse::new(pending, move |buf| {
            response::decode_tx_signature(buf, mode)
        }))
    }

    /// Sign an Invoke or DeployAccount transaction (V2 app); resolves once
    /// the user approves or denies it
    pub async fn sign_transaction(
        &self,
        path: &str,
        tx: &AccountTransaction,
    ) -> Result<PendingResponse<TxSignature, E::Error>, Error<E::Error>> {
        let operation = tx.operation();
        self.require(tx.instruction(), operation)?;
        let path: BIP32Path = path.parse()?;

        let frames = frame::sign_account_tx(&path, tx)?;
        debug!("{} with {} in {} frames", operation, path, frames.len());

        let mode = self.config.signature_decoding;
        let pending = self.controller.send_async(operation, frames).await?;
        Ok(PendingResponse::new(pending, move |buf| {
            response::decode_tx_signature(buf, mode)
        }))
    }

    /// Pedersen hash of two elements, computed on the device
    pub async fn compute_pedersen(
        &self,
        a: &FieldElement,
        b: &FieldElement,
        count: u8,
        variant: u8,
    ) -> Result<FieldElement, Error<E::Error>> {
        let operation = Operation::PedersenHash;
        self.require(InstructionCode::PedersenHash, operation)?;

        let command = frame::pedersen(a, b, count, variant)?;
        let reply = self.controller.send(operation, &command).await?;
        response::decode_field_hash(&reply.data)
            .map_err(|source| Error::Decode { operation, source })
    }

    /// Poseidon hash of one or two elements, computed on the device
    pub async fn compute_poseidon(
        &self,
        input: &PoseidonInput,
    ) -> Result<FieldElement, Error<E::Error>> {
        let operation = Operation::PoseidonHash;
        self.require(InstructionCode::PoseidonHash, operation)?;

        let command = frame::poseidon(input)?;
        let reply = self.controller.send(operation, &command).await?;
        response::decode_field_hash(&reply.data)
            .map_err(|source| Error::Decode { operation, source })
    }
}
