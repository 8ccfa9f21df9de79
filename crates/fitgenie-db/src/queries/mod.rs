//! Query functions, one module per table.

pub mod chat_messages;
pub mod plans;
