//! The orchestration loop: the heart of handoff.
//!
//! A turn follows an **ask → act → observe** cycle:
//!
//! 1. **Receive** user input for the active persona
//! 2. **Recall** a memory digest (best-effort) for the system prompt
//! 3. **Ask** the model with the persona's prompt, history and tools
//! 4. **If tool calls**: run them in order, append results, loop back to 3.
//!    A `delegate` call runs a nested turn under another persona.
//! 5. **If text**: append it and return it
//!
//! The loop ends on a final answer, a fatal turn error, or the iteration cap.

mod best_effort;
pub mod delegation;
pub mod executor;
pub mod loop_runner;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use delegation::{DELEGATE_TOOL_NAME, DelegationFrame};
pub use executor::ToolExecutor;
pub use loop_runner::{AgentLoop, TurnContext};
pub use session::{Session, SessionStatus};
