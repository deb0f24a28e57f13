pub mod assets;
pub mod backup;
pub mod bulk;
pub mod config;
pub mod core;
pub mod template;
