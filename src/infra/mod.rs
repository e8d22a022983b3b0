#[cfg(feature = "docker")]
pub mod docker;
pub mod secrets;
