mod data_channel_manager;
mod diagnostics;
mod dispatcher;
mod endpoint;

pub use data_channel_manager::*;
pub use diagnostics::*;
pub use dispatcher::*;
pub use endpoint::*;
