//! Pending command state machine
//!
//! `Created -> AwaitingRemoteAck -> AwaitingAsyncResult -> Resolved`, or a
//! direct jump to `Resolved`/`TimedOut` from any live state. The result slot
//! is a `watch` channel written at most once; waiters observe the terminal
//! value without polling.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::ocpi::{
    CommandResponse, CommandResponseType, CommandResult, CommandResultType, CommandType,
    PartyScope,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandState {
    Created,
    AwaitingRemoteAck,
    AwaitingAsyncResult,
    Resolved,
    TimedOut,
}

impl CommandState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::TimedOut)
    }
}

/// How a command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Asynchronous result reported by the target.
    Result(CommandResult),
    /// The target refused the command synchronously.
    Refused(CommandResponse),
    /// The outbound call failed or the target may not be called.
    TransportFailure(String),
    TimedOut,
}

impl Resolution {
    /// The OCPI result reported to whoever asked for the command.
    pub fn to_result(&self) -> CommandResult {
        match self {
            Self::Result(result) => result.clone(),
            Self::Refused(response) => CommandResult {
                result: match response.result {
                    CommandResponseType::NotSupported => CommandResultType::NotSupported,
                    CommandResponseType::UnknownSession => CommandResultType::Failed,
                    CommandResponseType::Rejected | CommandResponseType::Accepted => {
                        CommandResultType::Rejected
                    }
                },
                message: response.message.clone(),
            },
            Self::TransportFailure(reason) => CommandResult {
                result: CommandResultType::Failed,
                message: Some(reason.clone()),
            },
            Self::TimedOut => CommandResult {
                result: CommandResultType::Timeout,
                message: None,
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Result(_) => "result",
            Self::Refused(_) => "refused",
            Self::TransportFailure(_) => "transport_failure",
            Self::TimedOut => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub state: CommandState,
    pub resolution: Option<Resolution>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Party that asked us for the command and the url expecting its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Originator {
    pub party: PartyScope,
    pub response_url: String,
}

pub struct PendingCommand {
    pub correlation_id: Uuid,
    pub kind: CommandType,
    pub target: PartyScope,
    pub originator: Option<Originator>,
    pub created_at: DateTime<Utc>,
    deadline: Mutex<Option<DateTime<Utc>>>,
    timer: Mutex<Option<AbortHandle>>,
    slot: watch::Sender<Slot>,
}

impl PendingCommand {
    pub fn new(kind: CommandType, target: PartyScope, originator: Option<Originator>) -> Self {
        let (slot, _) = watch::channel(Slot {
            state: CommandState::Created,
            resolution: None,
            resolved_at: None,
        });
        Self {
            correlation_id: Uuid::new_v4(),
            kind,
            target,
            originator,
            created_at: Utc::now(),
            deadline: Mutex::new(None),
            timer: Mutex::new(None),
            slot,
        }
    }

    pub fn state(&self) -> CommandState {
        self.slot.borrow().state
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.slot.borrow().resolution.clone()
    }

    /// Move between live states. Ignored once terminal.
    pub fn advance(&self, state: CommandState) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.state.is_terminal() || slot.state == state {
                return false;
            }
            slot.state = state;
            true
        })
    }

    /// Set the result slot. Returns the state the command was in, or `None`
    /// when it was already resolved.
    pub fn resolve(&self, resolution: Resolution) -> Option<CommandState> {
        let mut previous = None;
        let terminal = if resolution == Resolution::TimedOut {
            CommandState::TimedOut
        } else {
            CommandState::Resolved
        };
        self.slot.send_if_modified(|slot| {
            if slot.resolution.is_some() {
                return false;
            }
            previous = Some(slot.state);
            slot.state = terminal;
            slot.resolution = Some(resolution);
            slot.resolved_at = Some(Utc::now());
            true
        });
        if previous.is_some() {
            self.cancel_timer();
        }
        previous
    }

    pub fn arm_timer(&self, deadline: DateTime<Utc>, timer: AbortHandle) {
        if let Ok(mut slot) = self.deadline.lock() {
            *slot = Some(deadline);
        }
        if let Ok(mut slot) = self.timer.lock() {
            *slot = Some(timer);
        }
    }

    pub fn has_timer(&self) -> bool {
        self.timer.lock().map(|t| t.is_some()).unwrap_or(false)
    }

    fn cancel_timer(&self) {
        if let Ok(mut slot) = self.timer.lock() {
            if let Some(timer) = slot.take() {
                timer.abort();
            }
        }
    }

    /// Wait until the result slot is set.
    pub async fn wait(&self) -> Resolution {
        let mut rx = self.slot.subscribe();
        let resolution = match rx.wait_for(|slot| slot.resolution.is_some()).await {
            Ok(slot) => slot.resolution.clone(),
            Err(_) => None,
        };
        resolution.unwrap_or(Resolution::TimedOut)
    }

    pub fn view(&self) -> CommandView {
        let slot = self.slot.borrow();
        CommandView {
            correlation_id: self.correlation_id,
            command: self.kind,
            target: self.target.to_string(),
            state: slot.state,
            result: slot.resolution.as_ref().map(Resolution::to_result),
            created_at: self.created_at,
            deadline: self.deadline.lock().ok().and_then(|d| *d),
            resolved_at: slot.resolved_at,
        }
    }
}

/// Externally visible snapshot of a command.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommandView {
    pub correlation_id: Uuid,
    #[schema(value_type = String)]
    pub command: CommandType,
    pub target: String,
    pub state: CommandState,
    #[schema(value_type = Option<Object>)]
    pub result: Option<CommandResult>,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> PendingCommand {
        PendingCommand::new(
            CommandType::StartSession,
            PartyScope::parse("DE", "CPO").unwrap(),
            None,
        )
    }

    fn accepted() -> Resolution {
        Resolution::Result(CommandResult {
            result: CommandResultType::Accepted,
            message: None,
        })
    }

    #[test]
    fn result_slot_is_set_at_most_once() {
        let cmd = command();
        assert!(cmd.advance(CommandState::AwaitingRemoteAck));
        assert_eq!(cmd.resolve(accepted()), Some(CommandState::AwaitingRemoteAck));
        assert_eq!(cmd.resolve(Resolution::TimedOut), None);
        assert_eq!(cmd.state(), CommandState::Resolved);
        assert_eq!(cmd.resolution(), Some(accepted()));
        assert!(!cmd.advance(CommandState::AwaitingAsyncResult));
    }

    #[test]
    fn timeout_is_its_own_terminal_state() {
        let cmd = command();
        cmd.resolve(Resolution::TimedOut);
        assert_eq!(cmd.state(), CommandState::TimedOut);
        assert_eq!(cmd.view().result.unwrap().result, CommandResultType::Timeout);
    }

    #[tokio::test]
    async fn waiters_observe_the_resolution() {
        let cmd = std::sync::Arc::new(command());
        let waiter = {
            let cmd = cmd.clone();
            tokio::spawn(async move { cmd.wait().await })
        };
        tokio::task::yield_now().await;
        cmd.resolve(Resolution::TransportFailure("unreachable".to_string()));
        assert_eq!(
            waiter.await.unwrap(),
            Resolution::TransportFailure("unreachable".to_string())
        );
    }

    #[test]
    fn refusals_map_to_results() {
        let refused = Resolution::Refused(CommandResponse {
            result: CommandResponseType::NotSupported,
            timeout: 0,
            message: None,
        });
        assert_eq!(refused.to_result().result, CommandResultType::NotSupported);
    }
}
