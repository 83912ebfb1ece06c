// src/utils/mod.rs

pub mod image;
pub mod jwt;
