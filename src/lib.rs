//! Per-project persistent memory for LLM agents.
//!
//! memo stores short textual records and imported document chunks in a
//! per-project SQLite database, embeds them with a local ONNX model, and
//! retrieves them with a hybrid of exact-KNN vector search and FTS5 BM25
//! keyword search fused by Reciprocal Rank Fusion.
//!
//! # Architecture
//!
//! - **Storage**: one database per project at `<project-root>/.memo/memo.db`,
//!   three synchronised tables (records, [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   KNN index, FTS5 index) plus a persistent embedding cache
//! - **Embeddings**: local ONNX Runtime with `Xenova/nomic-embed-text-v1`
//!   (768 dimensions) behind a two-tier cache
//! - **Search**: gated vector KNN + BM25 merged via Reciprocal Rank Fusion
//! - **Scoping**: records live in containers — a worktree-stable project
//!   hash, or named slugs shared inside one project database
//!
//! # Modules
//!
//! - [`config`] — JSONC config file overlaid on built-in defaults
//! - [`db`] — SQLite initialization, pragmas, schema, sqlite-vec registration
//! - [`embedding`] — text-to-vector pipeline with L1/L2 caching
//! - [`identity`] — container tags and worktree-stable project identity
//! - [`import`] — markdown chunking and repo-map import
//! - [`memory`] — the store, hybrid search, and duplicate gate

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod import;
pub mod jsonc;
pub mod memory;
