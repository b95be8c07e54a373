//! Shared types for the blogchat realtime layer: the chat data model, the
//! socket event vocabulary, and the client-side error taxonomy.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
