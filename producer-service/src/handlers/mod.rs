pub mod agents;
pub mod messages;
pub mod topics;
