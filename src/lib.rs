pub mod artifact;
pub mod config;
pub mod docker;
pub mod lifecycle;
pub mod mounts;
pub mod pool;
pub mod runner;
pub mod server;
pub mod session;
pub mod shared;
pub mod store;
