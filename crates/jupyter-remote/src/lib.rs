#![doc = include_str!("../README.md")]

mod client;
pub mod contents;
pub mod execute;
mod websocket;

pub use client::*;
pub use contents::{
    ContentFormat, ContentType, ContentsApi, ContentsModel, GetOptions, NewUntitledRequest,
    SaveRequest,
};
pub use execute::{ExecutionCollector, KernelOutput, RemoteKernelSession};
pub use websocket::KernelSocket;
