//! Locks built out of file existence
//!
//! A lock is a token file in the same namespace as the index files. Holding
//! the lock means having created the token; releasing it deletes the token.
//! No in-process mutex is involved, the token row is the only shared state.

pub mod token_lock;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use token_lock::TokenLock;

/// Trait defining the lock interface handed out by the directory
pub trait Lock: Send {
    /// Name of the token file
    fn name(&self) -> &str;

    /// Try to take the lock. `Ok(false)` means someone else holds it, or the
    /// token could not be created right now.
    fn obtain(&mut self) -> Result<bool>;

    /// Whether the token currently exists
    fn is_locked(&self) -> Result<bool>;

    /// Give the lock up. Safe to call more than once.
    fn release(&mut self) -> Result<()>;

    /// Check that the lock obtained through this handle is still held
    fn ensure_valid(&self) -> Result<()>;
}

/// How `obtain` creates the token
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// Check for the token, then create it. Two racing processes can both
    /// pass the check.
    #[default]
    Advisory,
    /// Create the token with a single insert guarded by the unique file name
    Atomic,
}

impl std::str::FromStr for LockStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "advisory" => Ok(LockStrategy::Advisory),
            "atomic" => Ok(LockStrategy::Atomic),
            _ => Err(format!("Unknown lock strategy: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_strategy_from_str() {
        assert_eq!("advisory".parse::<LockStrategy>().unwrap(), LockStrategy::Advisory);
        assert_eq!("Atomic".parse::<LockStrategy>().unwrap(), LockStrategy::Atomic);
        assert!("select_for_update".parse::<LockStrategy>().is_err());
        assert_eq!(LockStrategy::default(), LockStrategy::Advisory);
    }
}
