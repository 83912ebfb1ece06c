// src/models/mod.rs

pub mod attempt;
pub mod profile;
pub mod question;
pub mod quiz;
pub mod session;
