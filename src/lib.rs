//! A framed message-passing TCP server with optional TLS termination and an
//! optional shared-secret handshake.
//!
//! The entry point is [`Server`]: build one with [`Server::builder`], install
//! whichever callbacks you need, call [`Server::start`], and drive it with the
//! send/administrative operations until [`Server::shutdown`].

pub mod acceptor;
pub mod callbacks;
pub mod cli;
pub mod client;
pub mod config;
pub mod defaults;
pub mod error;
pub mod identity;
pub mod initializer;
pub mod io_stream;
pub mod message;
pub mod reader;
pub mod registry;
pub mod server;
pub mod tls;
pub mod writer;

pub use callbacks::Callbacks;
pub use config::Config;
pub use error::{ConfigError, ServerError};
pub use identity::ClientId;
pub use message::{Message, Status};
pub use server::{Server, ServerBuilder};
