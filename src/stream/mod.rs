//! Streaming turn assembly.

pub mod accumulator;

pub use accumulator::{AccumulatorState, AssembledCall, DeltaAccumulator, Step, TurnOutput};
