//! Lifecycle hooks the SDK fires inside a turn.
//!
//! Six hook points cover the full event surface: pre/post tool use, prompt
//! submission, stop, subagent stop, and pre-compact. Handlers are async and
//! fallible; a hook error aborts the turn (the runtime treats hook
//! persistence as fatal), which is why they return `Result` rather than a
//! decision value.

use super::SdkError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Fired before a tool executes.
#[derive(Clone, Debug)]
pub struct PreToolUseEvent {
    pub tool_name: String,
    pub tool_input: Value,
    pub tool_use_id: Option<String>,
}

/// Fired after a tool executed, with its (possibly large) result.
#[derive(Clone, Debug)]
pub struct PostToolUseEvent {
    pub tool_name: String,
    pub tool_input: Value,
    pub result: Option<Value>,
    pub is_error: bool,
    pub tool_use_id: Option<String>,
}

/// Fired when a prompt enters the session.
#[derive(Clone, Debug)]
pub struct UserPromptSubmitEvent {
    pub prompt: String,
}

/// Fired when the turn stream terminates (also on interrupt).
#[derive(Clone, Debug)]
pub struct StopEvent {
    pub reason: String,
    pub num_turns: u32,
    pub duration_ms: u64,
}

#[derive(Clone, Debug)]
pub struct SubagentStopEvent {
    pub subagent_id: String,
}

/// Fired before the SDK compacts the conversation context.
#[derive(Clone, Debug)]
pub struct PreCompactEvent {
    pub tokens_before: u64,
}

type Handler<E> = Arc<dyn Fn(E) -> BoxFuture<'static, Result<(), SdkError>> + Send + Sync>;

/// Container for all registered hook handlers of one session.
#[derive(Clone, Default)]
pub struct Hooks {
    pre_tool_use: Vec<Handler<PreToolUseEvent>>,
    post_tool_use: Vec<Handler<PostToolUseEvent>>,
    user_prompt_submit: Vec<Handler<UserPromptSubmitEvent>>,
    stop: Vec<Handler<StopEvent>>,
    subagent_stop: Vec<Handler<SubagentStopEvent>>,
    pre_compact: Vec<Handler<PreCompactEvent>>,
}

macro_rules! hook_point {
    ($add:ident, $fire:ident, $field:ident, $event:ty) => {
        pub fn $add<F, Fut>(mut self, handler: F) -> Self
        where
            F: Fn($event) -> Fut + Send + Sync + 'static,
            Fut: std::future::Future<Output = Result<(), SdkError>> + Send + 'static,
        {
            self.$field.push(Arc::new(move |ev| Box::pin(handler(ev))));
            self
        }

        /// Runs every registered handler in order; the first error aborts.
        pub async fn $fire(&self, event: $event) -> Result<(), SdkError> {
            for handler in &self.$field {
                handler(event.clone()).await?;
            }
            Ok(())
        }
    };
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    hook_point!(add_pre_tool_use, fire_pre_tool_use, pre_tool_use, PreToolUseEvent);
    hook_point!(add_post_tool_use, fire_post_tool_use, post_tool_use, PostToolUseEvent);
    hook_point!(
        add_user_prompt_submit,
        fire_user_prompt_submit,
        user_prompt_submit,
        UserPromptSubmitEvent
    );
    hook_point!(add_stop, fire_stop, stop, StopEvent);
    hook_point!(add_subagent_stop, fire_subagent_stop, subagent_stop, SubagentStopEvent);
    hook_point!(add_pre_compact, fire_pre_compact, pre_compact, PreCompactEvent);
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_tool_use", &self.pre_tool_use.len())
            .field("post_tool_use", &self.post_tool_use.len())
            .field("user_prompt_submit", &self.user_prompt_submit.len())
            .field("stop", &self.stop.len())
            .field("subagent_stop", &self.subagent_stop.len())
            .field("pre_compact", &self.pre_compact.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let first = calls.clone();
        let second = calls.clone();
        let hooks = Hooks::new()
            .add_pre_tool_use(move |_ev| {
                let c = first.clone();
                async move {
                    assert_eq!(c.fetch_add(1, Ordering::SeqCst), 0);
                    Ok(())
                }
            })
            .add_pre_tool_use(move |_ev| {
                let c = second.clone();
                async move {
                    assert_eq!(c.fetch_add(1, Ordering::SeqCst), 1);
                    Ok(())
                }
            });

        hooks
            .fire_pre_tool_use(PreToolUseEvent {
                tool_name: "Read".into(),
                tool_input: json!({"file_path": "a.rs"}),
                tool_use_id: Some("t1".into()),
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn first_error_aborts_remaining_handlers() {
        let later = Arc::new(AtomicUsize::new(0));
        let later_clone = later.clone();
        let hooks = Hooks::new()
            .add_stop(|_ev| async { Err(SdkError::hook("insert failed")) })
            .add_stop(move |_ev| {
                let c = later_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });

        let err = hooks
            .fire_stop(StopEvent { reason: "done".into(), num_turns: 1, duration_ms: 5 })
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Hook(_)));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_hooks_are_noops() {
        Hooks::new()
            .fire_pre_compact(PreCompactEvent { tokens_before: 42 })
            .await
            .unwrap();
    }
}
