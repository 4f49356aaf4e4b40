//! Command Dispatcher
//!
//! Remote commands (reserve, start/stop session, unlock connector) are
//! correlated with their asynchronous results through [`PendingCommand`]
//! slots owned by the [`CommandDispatcher`].

pub mod dispatcher;
pub mod pending;

pub use dispatcher::{
    CommandConfig, CommandDispatcher, CommandError, Dispatched, ResolveOutcome,
    SharedCommandDispatcher,
};
pub use pending::{CommandState, CommandView, Originator, PendingCommand, Resolution};
