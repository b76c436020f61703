//! Gateway adapters for the remote commerce platform.

#![deny(unsafe_code)]

pub mod admin_api;
pub mod mock;

pub use admin_api::{AdminApiConfig, AdminApiGateway};
pub use mock::{StaticOrderGateway, UnreachableGateway};
