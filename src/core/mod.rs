//! Core authentication logic for the blog backend

pub mod auth;
pub mod config;
pub mod db;
pub mod metrics;
