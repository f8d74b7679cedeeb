//! Position management module

pub mod exit_rules;
pub mod manager;
pub mod monitor;
pub mod store;

pub use exit_rules::{
    ExitReason, Position, PositionRecord, PositionSnapshot, PositionState, SellInstruction,
};
pub use manager::PositionManager;
pub use store::PositionStore;
