//! REST projection of pipeline state

pub mod handlers;
pub mod router;
pub mod state;
