//! Client-facing route handlers

pub mod chat;
pub mod images;
pub mod models;
pub mod videos;
