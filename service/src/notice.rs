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

//! Server-to-client text
//!
//! Every line the relay itself emits is built here. Lines prefixed with
//! `***` are server notices; chat and private messages carry their own
//! framing.

/// First line sent on a new connection
pub const WELCOME: &str = "Welcome! Please set your nickname with: /nick YOUR_NAME";

/// Reply to anything other than `/nick` during the handshake
pub const NICK_REQUIRED: &str = "Please set nickname first: /nick YOUR_NAME";

/// Follow-up hint after a refused handshake name
pub const NICK_RETRY: &str = "Try: /nick NEWNAME";

/// Hint sent once the handshake completes
pub const HELP_HINT: &str = "*** Type /help for commands";

/// Static command summary
pub const HELP: &str = "*** Commands: /nick NAME | /list | /msg USER TEXT | /quit | /help";

/// Farewell sent on `/quit`
pub const BYE: &str = "*** Bye!";

/// Sent to every session when the server stops
pub const SHUTDOWN: &str = "*** Server shutting down";

/// Usage for `/nick`
pub const NICK_USAGE: &str = "*** Usage: /nick NEWNAME";

/// Usage for `/msg`
pub const MSG_USAGE: &str = "*** Usage: /msg USERNAME message";

pub fn nick_taken_during_handshake(name: &str) -> String {
    format!("*** Nick '{}' is taken, choose another.", name)
}

pub fn nick_taken(name: &str) -> String {
    format!("*** Nick '{}' is taken.", name)
}

pub fn nick_too_long(max: usize) -> String {
    format!("*** Nick too long (max {} characters).", max)
}

pub fn already_known_as(name: &str) -> String {
    format!("*** You are already known as {}", name)
}

pub fn registered_as(name: &str) -> String {
    format!("*** You are now known as {}", name)
}

pub fn joined(name: &str) -> String {
    format!("*** {} joined the chat", name)
}

pub fn departed(name: &str) -> String {
    format!("*** {} disconnected", name)
}

pub fn renamed(old: &str, new: &str) -> String {
    format!("*** {} is now known as {}", old, new)
}

pub fn user_list(names: &[String]) -> String {
    format!("*** Users: {}", names.join(", "))
}

pub fn chat(sender: &str, text: &str) -> String {
    format!("<{}> {}", sender, text)
}

pub fn private_from(sender: &str, text: &str) -> String {
    format!("[PM from {}] {}", sender, text)
}

pub fn private_to(target: &str, text: &str) -> String {
    format!("[PM to {}] {}", target, text)
}

pub fn no_such_user(target: &str) -> String {
    format!("*** No such user: {}", target)
}

pub fn unknown_command(command: &str) -> String {
    format!("*** Unknown command: {}. Type /help", command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_list_is_comma_joined() {
        let names = vec!["alice".to_string(), "bob".to_string()];
        assert_eq!(user_list(&names), "*** Users: alice, bob");
        assert_eq!(user_list(&[]), "*** Users: ");
    }

    #[test]
    fn test_message_framing() {
        assert_eq!(chat("alice", "hello"), "<alice> hello");
        assert_eq!(private_from("alice", "hi"), "[PM from alice] hi");
        assert_eq!(private_to("bob", "hi"), "[PM to bob] hi");
    }
}
