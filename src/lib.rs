// MuckRock gateway - library root for the binary and tests

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod muckrock;
pub mod routes;
pub mod rpc;
pub mod stdio;
pub mod tools;
