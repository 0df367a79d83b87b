//! Approval workflows. Each public operation is exactly one unit of work.

pub mod count;
pub mod disposal;
pub mod transfer;

pub use count::CountReconciler;
pub use disposal::DisposalWorkflow;
pub use transfer::TransferWorkflow;
