//! Session orchestration for Attaché.
//!
//! One `Session` drives one assistant run: system instruction and task
//! prompt in, a stream of observable events while running, a single
//! immutable `SessionOutcome` out.

pub mod prompt;
pub mod session;

pub use prompt::{daily_brief_prompt, system_instruction};
pub use session::{Session, SessionOutcome, SessionState};
