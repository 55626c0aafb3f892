//! Touch detection from raw glove pressure

mod processor;

pub use processor::TouchProcessor;
