pub mod config;
pub mod discovery;
pub mod distro;
pub mod error;
pub mod http;

#[cfg(test)]
pub mod test_utils;
