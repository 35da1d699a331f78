//! # Repository Module
//!
//! Database repository implementations for the Summit store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The Repository pattern keeps all SQL behind a typed API.               │
//! │                                                                         │
//! │  Sync engine                                                            │
//! │       │  store.queue().due(now, threshold, 50)                          │
//! │       ▼                                                                 │
//! │  QueueRepository ──► SQL ──► SQLite                                     │
//! │                                                                         │
//! │  • SQL is isolated in one place per aggregate                           │
//! │  • Cross-aggregate invariants (record + queue row move together)        │
//! │    are transactions inside the owning repository                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`records::RecordRepository`] - entity records (the LocalStore surface)
//! - [`queue::QueueRepository`] - durable operation queue
//! - [`cursor::CursorRepository`] - remote-delta pull cursor

pub mod cursor;
pub mod queue;
pub mod records;
