//! Sandbox Server Library
//!
//! Supervises a project's dev server and streams its events to WebSocket
//! clients, controlled from a headless stdin loop.

// Module declarations
pub mod headless;
pub mod transport;

// Re-export main entry points
pub use headless::run_headless;
