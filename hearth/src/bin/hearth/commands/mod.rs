pub mod content;
pub mod demo;
pub mod watch;
