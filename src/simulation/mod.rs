//! Deterministic Fault Injection Support
//!
//! The simulated buffer and sink draw every fault decision from a seeded
//! ChaCha8 stream, so a failing seed replays the exact same fault sequence.

mod rng;

pub use rng::DeterministicRng;
