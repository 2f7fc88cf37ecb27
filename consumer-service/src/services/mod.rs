pub mod handler;
pub mod heartbeat;
pub mod processor;
pub mod producer_client;
