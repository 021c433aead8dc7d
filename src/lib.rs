//! SHA Connect: outreach messaging, partner tracking and feedback for SHA
//! health services.

pub mod app;
pub mod campaign;
pub mod chatbot;
pub mod command;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod outbox;
pub mod records;
pub mod store;
pub mod translate;
