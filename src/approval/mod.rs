//! Human approval: pending suspensions, decisions, and client fan-out.

pub mod hub;
pub mod model;
pub mod registry;

pub use hub::{DecisionHub, Subscription};
pub use model::{ClientMessage, Decision, Notification, PendingApproval, Verdict};
pub use registry::{ApprovalRegistry, DecisionOutcome, Suspension};
