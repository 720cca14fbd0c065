pub mod app;
pub mod attributes;
pub mod commander;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod mapper;
pub mod omero;
pub mod output;
pub mod packer;
pub mod sheets;
pub mod xlsx;
