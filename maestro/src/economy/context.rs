//! Rolling context window: keeps the newest messages that fit within both
//! the message and token caps, always retaining system messages.

use super::estimate_tokens;

/// Trimming posture. `TokenPriority` applies the caps at 80%;
/// `MessagePriority` only reacts to the message cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimMode {
    Balanced,
    TokenPriority,
    MessagePriority,
}

/// The trimmer's view of one history message.
#[derive(Clone, Debug)]
pub struct ContextMessage {
    pub sender_type: String,
    pub text: String,
}

impl ContextMessage {
    pub fn new(sender_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self { sender_type: sender_type.into(), text: text.into() }
    }

    fn is_system(&self) -> bool {
        self.sender_type == "system"
    }
}

/// Analyzer output: totals, per-role counts, over-limit flags.
#[derive(Clone, Debug)]
pub struct MessageStats {
    pub total_messages: usize,
    pub total_tokens: u64,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub system_messages: usize,
    pub exceeds_message_limit: bool,
    pub exceeds_token_limit: bool,
}

pub struct ContextTrimmer {
    max_messages: usize,
    max_tokens: u64,
    preserve_system: bool,
    mode: TrimMode,
}

impl ContextTrimmer {
    pub fn new(max_messages: usize, max_tokens: u64, preserve_system: bool, mode: TrimMode) -> Self {
        Self { max_messages, max_tokens, preserve_system, mode }
    }

    pub fn analyze(&self, messages: &[ContextMessage]) -> MessageStats {
        let mut total_tokens = 0u64;
        let (mut user, mut assistant, mut system) = (0usize, 0usize, 0usize);
        for msg in messages {
            total_tokens += estimate_tokens(&msg.text);
            match msg.sender_type.as_str() {
                "user" => user += 1,
                "orchestrator" => assistant += 1,
                "system" => system += 1,
                _ => {}
            }
        }
        MessageStats {
            total_messages: messages.len(),
            total_tokens,
            user_messages: user,
            assistant_messages: assistant,
            system_messages: system,
            exceeds_message_limit: messages.len() > self.max_messages,
            exceeds_token_limit: total_tokens > self.max_tokens,
        }
    }

    /// Trims to the configured limits. System messages are retained up front
    /// (when `preserve_system`); the rest is a rolling buffer keeping the
    /// newest messages, restored to chronological order.
    pub fn trim(&self, messages: &[ContextMessage]) -> Vec<ContextMessage> {
        if messages.is_empty() {
            return Vec::new();
        }
        let stats = self.analyze(messages);
        let needs_trim = match self.mode {
            TrimMode::MessagePriority => stats.exceeds_message_limit,
            _ => stats.exceeds_message_limit || stats.exceeds_token_limit,
        };
        if !needs_trim {
            return messages.to_vec();
        }

        let (system, rest): (Vec<_>, Vec<_>) = messages
            .iter()
            .cloned()
            .partition(|m| self.preserve_system && m.is_system());

        // Token-priority mode runs at 80% of both caps.
        let (effective_messages, effective_tokens) = if self.mode == TrimMode::TokenPriority {
            (
                (self.max_messages as f64 * 0.8) as usize,
                (self.max_tokens as f64 * 0.8) as u64,
            )
        } else {
            (self.max_messages, self.max_tokens)
        };

        let mut kept: Vec<ContextMessage> = Vec::new();
        let mut tokens = 0u64;
        for msg in rest.iter().rev() {
            let msg_tokens = estimate_tokens(&msg.text);
            if kept.len() >= effective_messages || tokens + msg_tokens > effective_tokens {
                break;
            }
            tokens += msg_tokens;
            kept.push(msg.clone());
        }
        kept.reverse();

        let mut result = system;
        result.extend(kept);
        tracing::debug!(
            before = stats.total_messages,
            after = result.len(),
            "context trimmed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(n: usize, text: &str) -> Vec<ContextMessage> {
        (0..n)
            .map(|i| {
                let sender = if i % 2 == 0 { "user" } else { "orchestrator" };
                ContextMessage::new(sender, format!("{text} {i}"))
            })
            .collect()
    }

    #[test]
    fn within_limits_is_untouched() {
        let trimmer = ContextTrimmer::new(10, 10_000, true, TrimMode::Balanced);
        let messages = msgs(4, "hello there");
        assert_eq!(trimmer.trim(&messages).len(), 4);
    }

    #[test]
    fn message_cap_keeps_the_newest() {
        let trimmer = ContextTrimmer::new(3, 1_000_000, true, TrimMode::Balanced);
        let messages = msgs(10, "msg");
        let out = trimmer.trim(&messages);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].text, "msg 7");
        assert_eq!(out[2].text, "msg 9");
    }

    #[test]
    fn token_cap_applies_too() {
        // Each message is 40 chars -> 10 tokens; cap at 25 keeps 2.
        let trimmer = ContextTrimmer::new(100, 25, true, TrimMode::Balanced);
        let messages: Vec<_> = (0..5)
            .map(|i| ContextMessage::new("user", format!("{:038}{}", 0, i)))
            .collect();
        let out = trimmer.trim(&messages);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn system_messages_are_preserved_up_front() {
        let trimmer = ContextTrimmer::new(2, 1_000_000, true, TrimMode::Balanced);
        let mut messages = vec![ContextMessage::new("system", "prompt")];
        messages.extend(msgs(6, "chat"));
        let out = trimmer.trim(&messages);
        assert_eq!(out[0].sender_type, "system");
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].text, "chat 5");
    }

    #[test]
    fn token_priority_uses_eighty_percent_caps() {
        let trimmer = ContextTrimmer::new(10, 1_000_000, true, TrimMode::TokenPriority);
        let messages = msgs(20, "m");
        // 80% of 10 messages = 8.
        assert_eq!(trimmer.trim(&messages).len(), 8);
    }

    #[test]
    fn message_priority_ignores_token_overflow() {
        let trimmer = ContextTrimmer::new(10, 1, true, TrimMode::MessagePriority);
        let messages = msgs(5, "long message body text");
        assert_eq!(trimmer.trim(&messages).len(), 5);
    }

    #[test]
    fn analyze_counts_roles_and_flags() {
        let trimmer = ContextTrimmer::new(2, 4, true, TrimMode::Balanced);
        let messages = vec![
            ContextMessage::new("system", "sys"),
            ContextMessage::new("user", "hello hello hello"),
            ContextMessage::new("orchestrator", "reply"),
        ];
        let stats = trimmer.analyze(&messages);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.assistant_messages, 1);
        assert_eq!(stats.system_messages, 1);
        assert!(stats.exceeds_message_limit);
        assert!(stats.exceeds_token_limit);
    }
}
