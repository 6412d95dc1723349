pub use pxstream_core::{SessionId, StreamConfig};

pub mod model {
    pub use pxstream_core::model::*;
}

pub mod protocol {
    pub use pxstream_core::protocol::*;
}

pub mod config {
    pub use pxstream_core::config::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use pxstream_client::*;
}
