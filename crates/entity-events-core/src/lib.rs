//! Entity Events Core: shared abstractions.
//!
//! This crate defines the event model, the processor contract, and the
//! repository traits that the engine, the store, and collaborators depend on.
//! It contains no infrastructure code.

pub mod clock;
pub mod content;
pub mod context;
pub mod error;
pub mod event;
pub mod processor;
pub mod repository;
pub mod state;
