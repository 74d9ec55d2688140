pub mod document;
pub mod principal;
pub mod requests;
pub mod strategy;
pub mod user;
