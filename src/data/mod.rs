// ============================================================
// Layer 4 — Data
// ============================================================
// Turns preference pairs into tensor batches:
//
//   SyntheticPreferences  → seeded toy (prompt, chosen, rejected) pairs
//       │
//       ▼
//   PreferenceBatcher     → pads both sides and stacks them into tensors
//
// Pairs arrive already tokenised; this layer never sees text.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Seeded generator of toy preference pairs
pub mod synthetic;

/// Implements Burn's Batcher trait for preference pairs
pub mod batcher;
