mod arbiter;

pub use arbiter::*;
