// src/models/mod.rs

pub mod attempt;
pub mod category;
pub mod practice;
pub mod question;
pub mod session;
pub mod user;
