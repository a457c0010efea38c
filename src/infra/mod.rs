// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting file I/O used by the CLI and application layers:
//
//   config_store.rs — TrainConfig as JSON on disk
//                     (`--config` input, `init-config` output)
//
//   metrics.rs      — Per-step DPO statistics: loss, implicit
//                     rewards, reward margin and accuracy,
//                     appended to a CSV file
//
// Reference: Rust Book §9 (Error Handling with anyhow)

/// Training configuration persistence
pub mod config_store;

/// Training metrics CSV logger
pub mod metrics;
