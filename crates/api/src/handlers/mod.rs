pub mod chat;
pub mod comfyui;
pub mod ui;
