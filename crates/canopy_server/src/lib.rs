//! Canopy Collaboration Server
//!
//! HTTP + WebSocket server for the Canopy collaborative editor.
//!
//! ## Features
//!
//! - **Page/block REST API**: thin handlers over `canopy_core`'s ordered
//!   hierarchical store
//! - **Realtime collaboration**: per-page rooms with presence tracking and
//!   operation/cursor relay over WebSockets
//! - **Store-driven broadcasts**: every accepted mutation is fanned out to
//!   the page's room so collaborators observe it consistently
//!
//! ## Environment Variables
//!
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 4000)
//! - `DATABASE_PATH`: Path to SQLite database (default: ./canopy.db)
//! - `CORS_ORIGINS`: Comma-separated list of allowed origins

pub mod collab;
pub mod config;
pub mod handlers;

pub use config::Config;
