// src/services/mod.rs

pub mod authoring;
pub mod leaderboard;
pub mod parser;
pub mod scoring;
pub mod session;
