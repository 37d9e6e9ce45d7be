//! State module for tracking orchestration progress
//!
//! This module provides the status machines for tasks and identities.
//!
//! # Components
//!
//! - `TaskStatus`: Tracks the lifecycle of individual crawl tasks (pending, in progress, terminal, etc.)
//! - `IdentityStatus`: Tracks the health of crawl identities in the pool

mod identity_status;
mod task_status;

// Re-export main types
pub use identity_status::IdentityStatus;
pub use task_status::TaskStatus;
