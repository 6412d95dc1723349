mod command_queue;
mod listener;
mod orchestrator;
mod session_command;
mod session_event;
mod session_handle;
mod snapshot;

pub use listener::*;
pub use orchestrator::*;
pub use session_event::*;
pub use session_handle::*;
pub use snapshot::*;
