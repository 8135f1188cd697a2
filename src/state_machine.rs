//! Expense entry dialogue state machine
//!
//! Elm-style: a pure `transition` consumes one typed input and returns the
//! next state plus the effects the runtime must execute.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;
pub mod view;


pub use effect::Effect;
pub use event::{ActionId, Event, LoadFailure, ViewAction};
pub use state::{ClearReason, LedgerState, SessionContext, CANCEL_KEYWORD};
pub use transition::{transition, TransitionError};
