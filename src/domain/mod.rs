pub mod connection;
pub mod diagnostic;
pub mod ticket;
