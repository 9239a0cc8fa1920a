pub mod bluetooth;
pub mod console;
pub mod hardware;
pub mod logging;
