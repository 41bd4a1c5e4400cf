//! Output generation: the JSON documents consumed by the web client.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── feeds.json      # aggregate: every published entry
//! ├── monde.json      # per-category documents, same shape, filtered items
//! ├── economie.json
//! └── ...
//! ```
//!
//! All writes are atomic (temp file + rename): the client polls these files
//! and must never observe a half-written document.

pub mod json;
