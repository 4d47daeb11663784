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
// Scripted in-memory device

use std::collections::VecDeque;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ledger_transport::{APDUAnswer, APDUCommand, Exchange};
use log::LevelFilter;
use simplelog::SimpleLogger;
use tokio::sync::Notify;

pub fn setup_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };
    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

#[derive(Debug, thiserror::Error)]
#[error("mock transport: {0}")]
pub struct MockError(&'static str);

struct Step {
    needs_user: bool,
    answer: Vec<u8>,
}

#[derive(Default)]
struct State {
    script: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<Vec<u8>>>,
    user: Notify,
}

/// Answers frames from a script, recording everything it receives
#[derive(Clone, Default)]
pub struct MockDevice(Arc<State>);

impl MockDevice {
    fn push(self, needs_user: bool, answer: &str) -> Self {
        let answer = hex::decode(answer).expect("invalid hex in script");
        self.0
            .script
            .lock()
            .unwrap()
            .push_back(Step { needs_user, answer });
        self
    }

    /// Queue an answer (payload and status word, hex)
    pub fn reply(self, answer: &str) -> Self {
        self.push(false, answer)
    }

    /// Queue an answer only released by [`MockDevice::approve`]
    pub fn reply_after_user(self, answer: &str) -> Self {
        self.push(true, answer)
    }

    /// Press the button
    pub fn approve(&self) {
        self.0.user.notify_one();
    }

    /// Frames received so far, hex encoded
    pub fn sent(&self) -> Vec<String> {
        self.0.sent.lock().unwrap().iter().map(hex::encode).collect()
    }
}

#[async_trait]
impl Exchange for MockDevice {
    type Error = MockError;
    type AnswerType = Vec<u8>;

    async fn exchange<I>(
        &self,
        command: &APDUCommand<I>,
    ) -> Result<APDUAnswer<Self::AnswerType>, Self::Error>
    where
        I: Deref<Target = [u8]> + Send + Sync,
    {
        let mut raw = vec![
            command.cla,
            command.ins,
            command.p1,
            command.p2,
            command.data.len() as u8,
        ];
        raw.extend_from_slice(&command.data);
        self.0.sent.lock().unwrap().push(raw);

        let step = self.0.script.lock().unwrap().pop_front();
        let step = step.ok_or(MockError("script exhausted"))?;
        if step.needs_user {
            self.0.user.notified().await;
        }

        APDUAnswer::from_answer(step.answer).map_err(|_| MockError("answer too short"))
    }
}
