pub mod config;
pub mod db;
pub mod load;
pub mod probe;
