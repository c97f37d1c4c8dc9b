//! Demo service built on the adapter and router utilities

pub mod handlers;
pub mod middleware;
pub mod routes;
