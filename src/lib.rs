//! # IIIF Engine
//!
//! The transformation core of an IIIF Image API server: take a source image
//! and a request such as `0,0,100,100/50,50/!90/gray.png`, and produce the
//! derived image bytes and their content type.
//!
//! # Architecture: One Pipeline, Two Engines
//!
//! ```text
//! Source ──bytes──▶ Image ──transform(Transformation)──▶ body() + content_type()
//!                     │
//!                     └── Box<dyn ImageEngine>  (software | accelerated)
//! ```
//!
//! The ordered pipeline (crop → resize → flip/rotate → gray/bitonal → format →
//! custom quality → animated reconciliation) lives in exactly one place,
//! [`imaging::transform`], and talks to engines only through the
//! [`imaging::ImageEngine`] trait. The two engines differ in *how* they
//! execute, not in *what* a request produces:
//!
//! - **Software**: decodes the whole image (every GIF frame) and applies
//!   each operation immediately.
//! - **Accelerated**: reads only the header, stages operations, and runs each
//!   staged batch in a single decode → SIMD process → encode pass.
//!
//! For identical inputs both engines report identical output dimensions.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Transformations, engines, the pipeline, custom qualities, format registry |
//! | [`source`] | Identifier → raw bytes (`DiskSource`, `MemorySource`) |
//! | [`profile`] | IIIF `info.json` document for an image |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Errors Are Values
//!
//! Every fallible step, including producing the output bytes, returns a
//! `Result`. A failed transformation leaves the image partially transformed;
//! callers discard it rather than serve it.
//!
//! ## No Shared Mutable State
//!
//! An [`imaging::Image`] is owned by one request. Sources and configuration
//! are read-only and shared freely, which is what lets the `batch` command
//! fan requests out over a rayon pool with no locking.

pub mod config;
pub mod imaging;
pub mod output;
pub mod profile;
pub mod source;
