// SPDX-License-Identifier: Apache-2.0
pub mod config;
pub mod directory;
pub mod gate;
pub mod gateway;
pub mod host;
pub mod logging;
pub mod middleware;
pub mod pages;
pub mod portal;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod session;
pub mod tls;
