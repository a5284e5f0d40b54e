pub mod aggregator;
pub mod api;
pub mod bridge;
pub mod cli;
pub mod publisher;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod selector;
pub mod session;
pub mod startup;
pub mod state;
