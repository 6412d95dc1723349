mod encoders;
mod input_event;

pub use encoders::*;
pub use input_event::*;
