pub mod actions;
pub mod assets;
pub mod config;
pub mod controller;
pub mod game;
pub mod layout;
pub mod logger;
pub mod matcher;
pub mod ocr;
pub mod platform;
pub mod policy;
pub mod sleep;
pub mod state;
pub mod types;
