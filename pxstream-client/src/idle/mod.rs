mod idle_monitor;

pub use idle_monitor::*;
