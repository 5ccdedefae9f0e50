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

//! Slash commands
//!
//! [`Command::parse`] turns a trimmed `/`-line into a [`Command`]; the
//! [`CommandDispatcher`] runs it on behalf of an active session. Dispatch
//! never fails: malformed input and unknown commands produce a reply to the
//! issuing session instead of an error.

use crate::{ClientRegistry, RegistryError, SessionId, notice};
use std::sync::Arc;
use tracing::debug;

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/quit`
    Quit,
    /// `/nick NAME`; `None` when the name is missing
    ///
    /// The whole argument is kept, so `/nick john smith` carries
    /// `"john smith"` and is refused as a multi-word name.
    Nick(Option<String>),
    /// `/list`
    List,
    /// `/msg USER TEXT`; `None` when either argument is missing
    Msg(Option<PrivateMessage>),
    /// `/help`
    Help,
    /// Any other `/word`, lowercased
    Unknown(String),
}

/// Arguments of `/msg`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessage {
    pub target: String,
    pub text: String,
}

impl Command {
    /// Parse a trimmed line
    ///
    /// Returns `None` if the line is not a command. The command word is
    /// case-insensitive; arguments are split on whitespace.
    pub fn parse(line: &str) -> Option<Command> {
        if !line.starts_with('/') {
            return None;
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let word = word.to_lowercase();

        let command = match word.as_str() {
            "/quit" => Command::Quit,
            "/nick" => Command::Nick(Some(rest.to_string()).filter(|name| !name.is_empty())),
            "/list" => Command::List,
            "/msg" => Command::Msg(Self::parse_private(rest)),
            "/help" => Command::Help,
            _ => Command::Unknown(word),
        };
        Some(command)
    }

    fn parse_private(rest: &str) -> Option<PrivateMessage> {
        let (target, text) = rest.split_once(char::is_whitespace)?;
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(PrivateMessage {
            target: target.to_string(),
            text: text.to_string(),
        })
    }
}

/// Check a display name against the configured length limit
pub fn name_too_long(name: &str, max_name_length: usize) -> bool {
    name.chars().count() > max_name_length
}

/// Display names are single words
pub fn name_is_word(name: &str) -> bool {
    !name.chars().any(char::is_whitespace)
}

/// What the session should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading lines
    Continue,
    /// Close the session
    Quit,
}

/// Runs commands for active sessions
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    registry: Arc<ClientRegistry>,
    max_name_length: usize,
}

impl CommandDispatcher {
    /// Create a dispatcher over `registry`
    pub fn new(registry: Arc<ClientRegistry>, max_name_length: usize) -> Self {
        Self {
            registry,
            max_name_length,
        }
    }

    /// Run `command` on behalf of session `id`
    pub async fn dispatch(&self, id: SessionId, command: Command) -> Flow {
        debug!(session_id = %id, command = ?command, "Dispatching command");
        match command {
            Command::Quit => {
                self.reply(id, notice::BYE).await;
                Flow::Quit
            }
            Command::Nick(None) => {
                self.reply(id, notice::NICK_USAGE).await;
                Flow::Continue
            }
            Command::Nick(Some(name)) => self.rename(id, &name).await,
            Command::List => {
                let names = self.registry.snapshot().await;
                self.reply(id, &notice::user_list(&names)).await;
                Flow::Continue
            }
            Command::Msg(None) => {
                self.reply(id, notice::MSG_USAGE).await;
                Flow::Continue
            }
            Command::Msg(Some(message)) => self.private_message(id, message).await,
            Command::Help => {
                self.reply(id, notice::HELP).await;
                Flow::Continue
            }
            Command::Unknown(word) => {
                self.reply(id, &notice::unknown_command(&word)).await;
                Flow::Continue
            }
        }
    }

    async fn rename(&self, id: SessionId, name: &str) -> Flow {
        if !name_is_word(name) {
            self.reply(id, notice::NICK_USAGE).await;
            return Flow::Continue;
        }
        if name_too_long(name, self.max_name_length) {
            self.reply(id, &notice::nick_too_long(self.max_name_length))
                .await;
            return Flow::Continue;
        }

        match self.registry.name_of(id).await {
            Some(current) if current == name => {
                self.reply(id, &notice::already_known_as(name)).await;
                return Flow::Continue;
            }
            Some(_) => {}
            None => return Flow::Quit,
        }

        match self.registry.try_rename(id, name).await {
            Ok(old) => {
                self.registry
                    .broadcast(&notice::renamed(&old, name), None)
                    .await;
                Flow::Continue
            }
            Err(RegistryError::NameTaken(taken)) => {
                self.reply(id, &notice::nick_taken(&taken)).await;
                Flow::Continue
            }
            Err(
                RegistryError::NotRegistered
                | RegistryError::AlreadyRegistered
                | RegistryError::Closed,
            ) => Flow::Quit,
        }
    }

    async fn private_message(&self, id: SessionId, message: PrivateMessage) -> Flow {
        let Some(sender) = self.registry.name_of(id).await else {
            return Flow::Quit;
        };

        let delivered = self
            .registry
            .send_to_name(&message.target, &notice::private_from(&sender, &message.text))
            .await;
        if delivered {
            self.reply(id, &notice::private_to(&message.target, &message.text))
                .await;
        } else {
            self.reply(id, &notice::no_such_user(&message.target)).await;
        }
        Flow::Continue
    }

    async fn reply(&self, id: SessionId, text: &str) {
        self.registry.send_to(id, text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerMetrics;
    use crate::registry::tests::{Peer, connection, next_line};

    #[test]
    fn test_parse_non_command() {
        assert_eq!(Command::parse("hello /nick"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/quit"), Some(Command::Quit));
        assert_eq!(Command::parse("/QUIT now"), Some(Command::Quit));
        assert_eq!(Command::parse("/list"), Some(Command::List));
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(
            Command::parse("/dance wildly"),
            Some(Command::Unknown("/dance".to_string()))
        );
    }

    #[test]
    fn test_parse_nick() {
        assert_eq!(
            Command::parse("/nick  bob"),
            Some(Command::Nick(Some("bob".to_string())))
        );
        assert_eq!(
            Command::parse("/nick john smith"),
            Some(Command::Nick(Some("john smith".to_string())))
        );
        assert_eq!(Command::parse("/nick"), Some(Command::Nick(None)));
    }

    #[test]
    fn test_parse_msg() {
        assert_eq!(
            Command::parse("/msg bob  hi there "),
            Some(Command::Msg(Some(PrivateMessage {
                target: "bob".to_string(),
                text: "hi there".to_string(),
            })))
        );
        assert_eq!(Command::parse("/msg bob"), Some(Command::Msg(None)));
        assert_eq!(Command::parse("/msg"), Some(Command::Msg(None)));
    }

    #[test]
    fn test_name_too_long_counts_characters() {
        assert!(!name_too_long("ålice", 5));
        assert!(name_too_long("alice!", 5));
    }

    struct Fixture {
        dispatcher: CommandDispatcher,
        registry: Arc<ClientRegistry>,
        peers: Vec<Peer>,
    }

    async fn fixture(names: &[&str]) -> Fixture {
        let registry = Arc::new(ClientRegistry::new(Arc::new(ServerMetrics::new())));
        let mut peers = Vec::new();
        for (index, name) in names.iter().enumerate() {
            let (conn, peer) = connection(index as u64 + 1);
            registry.try_register(&conn, name).await.unwrap();
            peers.push(peer);
        }
        Fixture {
            dispatcher: CommandDispatcher::new(registry.clone(), 32),
            registry,
            peers,
        }
    }

    fn id(n: u64) -> SessionId {
        SessionId::new(n)
    }

    #[tokio::test]
    async fn test_quit_says_bye() {
        let mut f = fixture(&["alice"]).await;
        assert_eq!(f.dispatcher.dispatch(id(1), Command::Quit).await, Flow::Quit);
        assert_eq!(next_line(&mut f.peers[0]).await.as_deref(), Some(notice::BYE));
    }

    #[tokio::test]
    async fn test_nick_success_is_broadcast_to_everyone() {
        let mut f = fixture(&["alice", "bob"]).await;
        let flow = f
            .dispatcher
            .dispatch(id(1), Command::Nick(Some("ally".to_string())))
            .await;

        assert_eq!(flow, Flow::Continue);
        for peer in &mut f.peers {
            assert_eq!(
                next_line(peer).await.as_deref(),
                Some("*** alice is now known as ally")
            );
        }
        assert_eq!(f.registry.snapshot().await, vec!["ally", "bob"]);
    }

    #[tokio::test]
    async fn test_nick_collision_replies_to_sender_only() {
        let mut f = fixture(&["alice", "bob"]).await;
        f.dispatcher
            .dispatch(id(1), Command::Nick(Some("bob".to_string())))
            .await;

        assert_eq!(
            next_line(&mut f.peers[0]).await.as_deref(),
            Some("*** Nick 'bob' is taken.")
        );
        assert_eq!(next_line(&mut f.peers[1]).await, None);
        assert_eq!(f.registry.name_of(id(1)).await.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_nick_usage_and_limits() {
        let mut f = fixture(&["alice"]).await;

        f.dispatcher.dispatch(id(1), Command::Nick(None)).await;
        assert_eq!(
            next_line(&mut f.peers[0]).await.as_deref(),
            Some(notice::NICK_USAGE)
        );

        f.dispatcher
            .dispatch(id(1), Command::parse("/nick john smith").unwrap())
            .await;
        assert_eq!(
            next_line(&mut f.peers[0]).await.as_deref(),
            Some(notice::NICK_USAGE)
        );
        assert_eq!(f.registry.name_of(id(1)).await.as_deref(), Some("alice"));

        f.dispatcher
            .dispatch(id(1), Command::Nick(Some("x".repeat(33))))
            .await;
        assert_eq!(
            next_line(&mut f.peers[0]).await.as_deref(),
            Some("*** Nick too long (max 32 characters).")
        );

        f.dispatcher
            .dispatch(id(1), Command::Nick(Some("alice".to_string())))
            .await;
        assert_eq!(
            next_line(&mut f.peers[0]).await.as_deref(),
            Some("*** You are already known as alice")
        );
    }

    #[tokio::test]
    async fn test_list() {
        let mut f = fixture(&["alice", "bob", "carol"]).await;
        f.dispatcher.dispatch(id(2), Command::List).await;
        assert_eq!(
            next_line(&mut f.peers[1]).await.as_deref(),
            Some("*** Users: alice, bob, carol")
        );
        assert_eq!(next_line(&mut f.peers[0]).await, None);
    }

    #[tokio::test]
    async fn test_private_message() {
        let mut f = fixture(&["alice", "bob", "carol"]).await;
        let command = Command::parse("/msg bob hi").unwrap();
        f.dispatcher.dispatch(id(1), command).await;

        assert_eq!(
            next_line(&mut f.peers[1]).await.as_deref(),
            Some("[PM from alice] hi")
        );
        assert_eq!(
            next_line(&mut f.peers[0]).await.as_deref(),
            Some("[PM to bob] hi")
        );
        assert_eq!(next_line(&mut f.peers[2]).await, None);
    }

    #[tokio::test]
    async fn test_private_message_to_unknown_user() {
        let mut f = fixture(&["alice", "bob"]).await;
        let command = Command::parse("/msg carol hi").unwrap();
        f.dispatcher.dispatch(id(1), command).await;

        assert_eq!(
            next_line(&mut f.peers[0]).await.as_deref(),
            Some("*** No such user: carol")
        );
        assert_eq!(next_line(&mut f.peers[1]).await, None);
    }

    #[tokio::test]
    async fn test_msg_usage_help_and_unknown() {
        let mut f = fixture(&["alice"]).await;

        f.dispatcher.dispatch(id(1), Command::Msg(None)).await;
        f.dispatcher.dispatch(id(1), Command::Help).await;
        f.dispatcher
            .dispatch(id(1), Command::Unknown("/dance".to_string()))
            .await;

        let peer = &mut f.peers[0];
        assert_eq!(next_line(peer).await.as_deref(), Some(notice::MSG_USAGE));
        assert_eq!(next_line(peer).await.as_deref(), Some(notice::HELP));
        assert_eq!(
            next_line(peer).await.as_deref(),
            Some("*** Unknown command: /dance. Type /help")
        );
    }

    #[tokio::test]
    async fn test_unregistered_session_is_told_to_quit() {
        let f = fixture(&["alice"]).await;
        let flow = f
            .dispatcher
            .dispatch(id(7), Command::Nick(Some("ghost".to_string())))
            .await;
        assert_eq!(flow, Flow::Quit);
    }
}
