pub mod ip;
pub mod jwt;
