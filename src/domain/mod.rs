// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits that define what the system
// works on: preference pairs and tokenised sequences.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits

// Preference pairs, token sequences and the label sentinel
pub mod preference;

// Core abstractions (traits) that other layers implement
pub mod traits;
