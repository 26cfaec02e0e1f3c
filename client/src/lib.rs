pub mod client;
pub mod input_handler;

pub use client::{ChatClient, ClientReader, ClientWriter};
