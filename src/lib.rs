pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod raster;
pub mod render;
pub mod session;
pub mod store;
pub mod upload;
