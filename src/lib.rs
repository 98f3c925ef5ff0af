mod header;

pub mod connection;
pub mod drainer;
pub mod duration;
pub mod error;
pub mod probe;
pub mod report;
pub mod script;
pub mod session;
pub mod session_config;
pub mod waiter;
pub mod writer;

#[cfg(test)]
mod test;
