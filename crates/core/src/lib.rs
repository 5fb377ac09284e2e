#![deny(warnings)]

pub mod config;
pub mod decode;
pub mod karaoke;
pub mod library;
pub mod playback;
pub mod service;
pub mod story;
pub mod tts;
pub mod util;
