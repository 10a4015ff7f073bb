#![doc = include_str!("../README.md")]
pub mod config;
pub mod consts;
pub mod dht;
pub mod directory;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod message;
pub mod node;
pub mod storage;
#[cfg(test)]
mod tests;
pub mod transport;
