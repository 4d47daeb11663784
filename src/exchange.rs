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
//! Request/response driver over a [`Exchange`] transport.
//!
//! Frames of one operation are sent strictly in order, each one waiting for
//! the previous reply. The first non-success status aborts the operation and
//! later frames are never sent.
//!
//! Operations that need a user decision on the device are driven with
//! [`ExchangeController::send_async`]: every frame but the last is sent
//! immediately, the last one is handed to a background task and a
//! [`PendingExchange`] is returned. The transport stays reserved by that task
//! until the device replies, even when the handle is cancelled or dropped,
//! so a late reply is drained and never read by the next operation. A
//! request timeout works the same way: the caller gets
//! [`Error::RequestTimeout`] right away while the unanswered frame keeps the
//! transport until its reply comes in.

use std::fmt::{Debug, Display};
use std::ops::Deref;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ledger_transport::{APDUAnswer, Exchange};
use log::{debug, trace, warn};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::errors::{BuildError, DecodeError, DeviceError, Error, Operation};
use crate::frame::Frame;
use crate::params::{sw, ProtocolVersion};

/// Status word and payload returned for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Trailing status word
    pub status: u16,
    /// Payload without the status word
    pub data: Vec<u8>,
}

impl Reply {
    /// True for 0x9000
    pub fn is_success(&self) -> bool {
        self.status == sw::OK
    }
}

impl<B: Deref<Target = [u8]>> From<APDUAnswer<B>> for Reply {
    fn from(answer: APDUAnswer<B>) -> Self {
        Reply {
            status: answer.retcode(),
            data: answer.data().to_vec(),
        }
    }
}

/// Where an exchange is in its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExchangeState {
    /// No operation holds the transport
    Idle,
    /// Frames sent, waiting for replies that need no user action
    Sent,
    /// Final frame sent, waiting for the user to act on the device
    AwaitingUser,
    /// Reply received, or the exchange failed or was cancelled
    Resolved,
}

impl ExchangeState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ExchangeState::Sent,
            2 => ExchangeState::AwaitingUser,
            3 => ExchangeState::Resolved,
            _ => ExchangeState::Idle,
        }
    }
}

/// Exclusive use of the transport by one operation.
///
/// Publishes the operation's progress to the controller and reads as
/// [`ExchangeState::Idle`] again once released.
pub(crate) struct Link<E> {
    transport: OwnedMutexGuard<E>,
    state: Arc<AtomicU8>,
}

impl<E> Link<E> {
    fn set(&self, state: ExchangeState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

impl<E> Deref for Link<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.transport
    }
}

impl<E> Drop for Link<E> {
    fn drop(&mut self) {
        self.set(ExchangeState::Idle);
    }
}

fn check_status<E: Display + Debug>(
    protocol: ProtocolVersion,
    operation: Operation,
    frame: usize,
    reply: Reply,
) -> Result<Reply, Error<E>> {
    if reply.is_success() {
        return Ok(reply);
    }

    let kind = DeviceError::from_status(reply.status, protocol);
    debug!(
        "{} frame {} returned 0x{:04X} ({})",
        operation, frame, reply.status, kind
    );
    Err(Error::Status {
        operation,
        frame,
        status: reply.status,
        kind,
    })
}

/// Serialises operations over a shared transport
pub struct ExchangeController<E> {
    transport: Arc<Mutex<E>>,
    state: Arc<AtomicU8>,
    protocol: ProtocolVersion,
    request_timeout: Option<Duration>,
    user_timeout: Option<Duration>,
}

impl<E> Clone for ExchangeController<E> {
    fn clone(&self) -> Self {
        ExchangeController {
            transport: self.transport.clone(),
            state: self.state.clone(),
            protocol: self.protocol,
            request_timeout: self.request_timeout,
            user_timeout: self.user_timeout,
        }
    }
}

impl<E> ExchangeController<E>
where
    E: Exchange + Send + Sync + 'static,
    E::Error: Display + Debug + Send + 'static,
{
    /// Wrap a transport, status words are mapped for `protocol`
    pub fn new(transport: E, protocol: ProtocolVersion) -> Self {
        ExchangeController {
            transport: Arc::new(Mutex::new(transport)),
            state: Arc::new(AtomicU8::new(ExchangeState::Idle as u8)),
            protocol,
            request_timeout: None,
            user_timeout: None,
        }
    }

    /// Bound the wait for each reply that needs no user action
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Default bound applied by [`PendingExchange::resolve`]
    pub fn with_user_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.user_timeout = timeout;
        self
    }

    /// Protocol revision used for status mapping
    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// True while an operation holds the transport, including a cancelled
    /// one whose reply has not arrived yet
    pub fn is_busy(&self) -> bool {
        self.transport.try_lock().is_err()
    }

    /// State of the operation holding the transport, `Idle` if there is none
    pub fn state(&self) -> ExchangeState {
        ExchangeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Wait for the transport and reserve it
    pub(crate) async fn acquire(&self) -> Link<E> {
        let transport = self.transport.clone().lock_owned().await;
        let link = Link {
            transport,
            state: self.state.clone(),
        };
        link.set(ExchangeState::Sent);
        link
    }

    /// Exchange one frame, handing the link back with the reply.
    ///
    /// With a timeout the exchange runs in its own task that owns the link,
    /// so on expiry the reply is still read off the transport and dropped
    /// before anyone else can use it.
    async fn round_trip(
        link: Link<E>,
        frame: &Frame,
        timeout: Option<Duration>,
    ) -> Result<(Link<E>, Reply), Error<E::Error>> {
        trace!("=> {:02x?}", frame.serialize());

        let (link, result) = match timeout {
            None => {
                let command = frame.command();
                let result = link.exchange(&command).await.map(Reply::from);
                (link, result)
            }
            Some(t) => {
                let (tx, rx) = oneshot::channel();
                tokio::spawn(Self::drive(link, frame.clone(), tx));
                match tokio::time::timeout(t, rx).await {
                    Ok(Ok(done)) => done,
                    Ok(Err(_)) => return Err(Error::Cancelled),
                    Err(_) => {
                        debug!("no reply within {:?}, draining it", t);
                        return Err(Error::RequestTimeout);
                    }
                }
            }
        };

        let reply = result.map_err(Error::Transport)?;
        trace!("<= {:04x} {:02x?}", reply.status, reply.data);
        Ok((link, reply))
    }

    async fn drive(
        link: Link<E>,
        frame: Frame,
        tx: oneshot::Sender<(Link<E>, Result<Reply, E::Error>)>,
    ) {
        let command = frame.command();
        let result = link.exchange(&command).await.map(Reply::from);
        if tx.send((link, result)).is_err() {
            debug!("late reply drained");
        }
    }

    /// Single frame round trip
    pub async fn send(&self, operation: Operation, frame: &Frame) -> Result<Reply, Error<E::Error>> {
        self.send_all(operation, std::slice::from_ref(frame)).await
    }

    /// Send `frames` in order and return the last reply.
    ///
    /// Stops at the first non-success status, reporting the index of the
    /// frame that produced it.
    pub async fn send_all(
        &self,
        operation: Operation,
        frames: &[Frame],
    ) -> Result<Reply, Error<E::Error>> {
        debug!("{}: sending {} frame(s)", operation, frames.len());
        let mut link = self.acquire().await;

        let mut last = None;
        for (idx, frame) in frames.iter().enumerate() {
            let (next, reply) = Self::round_trip(link, frame, self.request_timeout).await?;
            link = next;
            last = Some(check_status(self.protocol, operation, idx, reply)?);
        }

        last.ok_or(Error::Build(BuildError::NoFrames))
    }

    /// Send `frames`, leaving the final reply to a [`PendingExchange`].
    ///
    /// Leading frames are acknowledged before this returns, so a device
    /// fault on any of them is reported here and the final frame is not sent.
    pub async fn send_async(
        &self,
        operation: Operation,
        mut frames: Vec<Frame>,
    ) -> Result<PendingExchange<E::Error>, Error<E::Error>> {
        let last = frames.pop().ok_or(Error::Build(BuildError::NoFrames))?;
        let final_idx = frames.len();

        debug!("{}: sending {} frame(s)", operation, final_idx + 1);
        let mut link = self.acquire().await;

        for (idx, frame) in frames.iter().enumerate() {
            let (next, reply) = Self::round_trip(link, frame, self.request_timeout).await?;
            link = next;
            check_status(self.protocol, operation, idx, reply)?;
        }

        link.set(ExchangeState::AwaitingUser);
        let (tx, rx) = oneshot::channel();
        tokio::spawn(Self::await_user(link, operation, last, tx));

        Ok(PendingExchange {
            operation,
            frame: final_idx,
            protocol: self.protocol,
            user_timeout: self.user_timeout,
            state: ExchangeState::AwaitingUser,
            rx: Some(rx),
            reply: None,
        })
    }

    async fn await_user(
        link: Link<E>,
        operation: Operation,
        frame: Frame,
        tx: oneshot::Sender<Result<Reply, E::Error>>,
    ) {
        trace!("=> {:02x?}", frame.serialize());

        let command = frame.command();
        let result = link.exchange(&command).await.map(Reply::from);

        if let Ok(reply) = &result {
            trace!("<= {:04x} {:02x?}", reply.status, reply.data);
        }
        if tx.send(result).is_err() {
            debug!("{}: handle gone, reply drained", operation);
        }
        // link is released here, once the device has answered
    }
}

/// Final reply of an operation waiting on the user
pub struct PendingExchange<E> {
    operation: Operation,
    frame: usize,
    protocol: ProtocolVersion,
    user_timeout: Option<Duration>,
    state: ExchangeState,
    rx: Option<oneshot::Receiver<Result<Reply, E>>>,
    reply: Option<Reply>,
}

impl<E: Display + Debug> PendingExchange<E> {
    /// Current state
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Operation this exchange belongs to
    pub fn operation(&self) -> Operation {
        self.operation
    }

    fn finish(&mut self, result: Result<Reply, E>) -> Result<Reply, Error<E>> {
        self.state = ExchangeState::Resolved;
        let reply = result.map_err(Error::Transport)?;
        check_status(self.protocol, self.operation, self.frame, reply)
    }

    /// Non-blocking check for the final reply.
    ///
    /// `Ok(None)` while the user has not acted. A failure is reported once;
    /// the handle reads as cancelled afterwards.
    pub fn poll(&mut self) -> Result<Option<&Reply>, Error<E>> {
        if self.reply.is_none() {
            let rx = self.rx.as_mut().ok_or(Error::Cancelled)?;
            match rx.try_recv() {
                Ok(result) => {
                    self.rx = None;
                    let reply = self.finish(result)?;
                    self.reply = Some(reply);
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => {
                    self.rx = None;
                    self.state = ExchangeState::Resolved;
                    return Err(Error::Cancelled);
                }
            }
        }
        Ok(self.reply.as_ref())
    }

    async fn wait(&mut self) -> Result<Reply, Error<E>> {
        if let Some(reply) = self.reply.take() {
            return Ok(reply);
        }
        let rx = self.rx.as_mut().ok_or(Error::Cancelled)?;
        let result = rx.await;
        self.rx = None;
        match result {
            Ok(result) => self.finish(result),
            Err(_) => {
                self.state = ExchangeState::Resolved;
                Err(Error::Cancelled)
            }
        }
    }

    /// Wait for the final reply, bounded by the configured user timeout
    pub async fn resolve(mut self) -> Result<Reply, Error<E>> {
        match self.user_timeout {
            Some(timeout) => self.resolve_timeout(timeout).await,
            None => self.wait().await,
        }
    }

    /// Wait at most `timeout` for the final reply.
    ///
    /// On expiry the device keeps its prompt open; the transport is released
    /// once it answers.
    pub async fn resolve_timeout(mut self, timeout: Duration) -> Result<Reply, Error<E>> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| Error::UserTimeout)?
    }

    /// Give up on the reply. The transport stays reserved until the device
    /// answers so the stale reply cannot be read by a later operation.
    pub fn cancel(mut self) {
        if self.rx.take().is_some() {
            debug!("{}: cancelled while awaiting the user", self.operation);
        }
        self.state = ExchangeState::Resolved;
    }
}

impl<E> Drop for PendingExchange<E> {
    fn drop(&mut self) {
        if self.rx.is_some() {
            warn!("{}: dropped while awaiting the user", self.operation);
        }
    }
}

type Decoder<T> = Box<dyn Fn(&[u8]) -> Result<T, DecodeError> + Send + Sync>;

/// A [`PendingExchange`] with the decoder for its reply payload
pub struct PendingResponse<T, E> {
    exchange: PendingExchange<E>,
    decode: Decoder<T>,
}

impl<T, E: Display + Debug> PendingResponse<T, E> {
    /// Attach `decode` to an exchange
    pub fn new<F>(exchange: PendingExchange<E>, decode: F) -> Self
    where
        F: Fn(&[u8]) -> Result<T, DecodeError> + Send + Sync + 'static,
    {
        PendingResponse {
            exchange,
            decode: Box::new(decode),
        }
    }

    /// Current state
    pub fn state(&self) -> ExchangeState {
        self.exchange.state()
    }

    /// Non-blocking check, decoding the reply once it is there
    pub fn poll(&mut self) -> Result<Option<T>, Error<E>> {
        let operation = self.exchange.operation();
        match self.exchange.poll()? {
            Some(reply) => (self.decode)(&reply.data)
                .map(Some)
                .map_err(|source| Error::Decode { operation, source }),
            None => Ok(None),
        }
    }

    /// Wait for the reply and decode it
    pub async fn resolve(self) -> Result<T, Error<E>> {
        let operation = self.exchange.operation();
        let reply = self.exchange.resolve().await?;
        (self.decode)(&reply.data).map_err(|source| Error::Decode { operation, source })
    }

    /// Wait at most `timeout` for the reply and decode it
    pub async fn resolve_timeout(self, timeout: Duration) -> Result<T, Error<E>> {
        let operation = self.exchange.operation();
        let reply = self.exchange.resolve_timeout(timeout).await?;
        (self.decode)(&reply.data).map_err(|source| Error::Decode { operation, source })
    }

    /// See [`PendingExchange::cancel`]
    pub fn cancel(self) {
        self.exchange.cancel()
    }
}
