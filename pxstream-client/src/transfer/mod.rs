mod reassembler;

pub use reassembler::*;
