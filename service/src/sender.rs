//
// Copyright 2017-2025 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Broadcast and unicast delivery
//!
//! Delivery never reports transport errors to the caller. A recipient whose
//! write fails is treated exactly as if it had disconnected: it is dropped
//! from the registry, its connection is closed and the others are told it
//! left. One failed recipient never stops delivery to the rest.

use crate::{ChatConnection, ClientRegistry, SessionId};
use tracing::debug;

impl ClientRegistry {
    /// Send one line to a registered session
    ///
    /// Returns `false` if the session is not registered or the write failed
    /// (in which case the session has been removed).
    pub async fn send_to(&self, id: SessionId, text: &str) -> bool {
        let mut sessions = self.lock().await;
        let Some(connection) = sessions.connection(id) else {
            debug!(session_id = %id, "Send to unregistered session dropped");
            return false;
        };

        let delivered = self.deliver_one(&connection, text).await;
        if !delivered {
            self.reap_locked(&mut sessions, vec![id]).await;
        }
        delivered
    }

    /// Send one line to the first session named `target`
    ///
    /// Returns whether such a session exists, regardless of whether the
    /// write itself succeeded.
    pub async fn send_to_name(&self, target: &str, text: &str) -> bool {
        let mut sessions = self.lock().await;
        let Some((id, connection)) = sessions.find_by_name(target) else {
            return false;
        };

        if !self.deliver_one(&connection, text).await {
            self.reap_locked(&mut sessions, vec![id]).await;
        }
        true
    }

    /// Send one line to every registered session except `excluding`
    pub async fn broadcast(&self, text: &str, excluding: Option<SessionId>) {
        let mut sessions = self.lock().await;
        let failed = self.deliver_locked(&sessions, text, excluding).await;
        self.reap_locked(&mut sessions, failed).await;
    }

    async fn deliver_one(&self, connection: &ChatConnection, text: &str) -> bool {
        match connection.send_line(text).await {
            Ok(()) => {
                self.metrics().message_relayed();
                true
            }
            Err(_) => {
                self.metrics().send_failed();
                false
            }
        }
    }
}
