//! # Crisis Harvest
//!
//! Time-bounded, keyword-filtered collection of social content into a local
//! store, so that downstream analysis of a disaster event can run offline.
//!
//! The core is the collection [`orchestrator`]: it drives source adapters
//! through a start/pause/resume/cancel lifecycle, applies the [`retry`]
//! policy around every fetch, persists results in idempotent batches, and
//! reports progress.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────────────┐
//! │  Adapters   │──▶│ Orchestrator │──▶│  BatchPersister     │
//! │ dump / http │   │ retry, pause │   │ SQLite + raw JSON   │
//! └─────────────┘   └──────┬───────┘   └────────────────────┘
//!                          │
//!                          ▼
//!                 progress / status (CLI: stderr)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init
//! harvest project create --name "Typhoon Yagi" --event typhoon \
//!     --region "Northern Vietnam" --start 2024-09-01 --end 2024-09-30 \
//!     --keyword "bão yagi" --keyword "lũ lụt" --source reddit --source tiktok
//! harvest collect <project-id>
//! harvest items <project-id> --limit 20
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Project lifecycle, items, validation |
//! | [`error`] | Failure classification and run errors |
//! | [`retry`] | Backoff decisions |
//! | [`adapter`] | Source adapter contract and registry |
//! | [`adapter_dump`] | JSON-lines export adapter |
//! | [`adapter_http`] | JSON search API adapter |
//! | [`store`] | Storage traits and in-memory store |
//! | [`sqlite_store`] | SQLite storage |
//! | [`raw`] | Raw-content batch files |
//! | [`control`] | Pause/cancel signals |
//! | [`progress`] | Progress reporters |
//! | [`orchestrator`] | Collection runs |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod adapter;
pub mod adapter_dump;
pub mod adapter_http;
pub mod collect_cmd;
pub mod config;
pub mod control;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod project_cmd;
pub mod raw;
pub mod retry;
pub mod sources;
pub mod sqlite_store;
pub mod store;
