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
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::params::ProtocolVersion;
use crate::response::DecodeMode;

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Protocol revision of the app on the device
    pub protocol: ProtocolVersion,
    /// Decoding of signature replies
    pub signature_decoding: DecodeMode,
    /// Timeout for user confirmation, `None` waits forever
    pub user_timeout_s: Option<u64>,
    /// Timeout for each request that needs no user action
    pub request_timeout_s: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            protocol: ProtocolVersion::default(),
            signature_decoding: DecodeMode::default(),
            user_timeout_s: None,
            request_timeout_s: 10,
        }
    }
}

impl Config {
    /// Helper to fetch user interaction timeout
    pub fn user_timeout(&self) -> Option<Duration> {
        self.user_timeout_s.map(Duration::from_secs)
    }

    /// Helper to fetch request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_s)
    }
}
