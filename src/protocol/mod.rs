//! Protocol layer shared by every connection.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Connection ──▶ Multiplexer ─┬─▶ http    (one request)   │
//! │  (transport)     (classify)  └─▶ session (line loop)     │
//! │                                     │                    │
//! │                                     ▼                    │
//! │                              CommandProcessor            │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod http;
pub mod mux;
pub mod session;
pub mod transport;
