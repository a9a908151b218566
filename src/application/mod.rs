// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing or printing (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Config, experiment layout and the training workflow
pub mod train_use_case;

// Scoring a saved checkpoint on the validation split
pub mod eval_use_case;
