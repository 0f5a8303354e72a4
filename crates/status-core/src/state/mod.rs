//! State management for order status records.
//!
//! This module provides the state machine that decides whether a status
//! change is legal and applies accepted changes to the repository.

pub mod order;

pub use order::{OrderStateMachine, Transition};
