//! Task assignment against team capacity
//!
//! [`assess`] is a pure advisory check. [`AssignmentBoard`] keeps the roster
//! snapshot it runs against and refreshes it after every assignment.

pub mod board;
pub mod capacity;

pub use board::{AssignmentBoard, AssignmentResult};
pub use capacity::{assess, projected_utilization, CapacityAssessment, CapacityPolicy, CapacityVerdict};
