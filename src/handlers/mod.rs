// src/handlers/mod.rs

pub mod admin;
pub mod profile;
pub mod quiz;
pub mod session;
