pub mod client;
pub mod deploy;
pub mod probe;
pub mod seed;
pub mod session;
