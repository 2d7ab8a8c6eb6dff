pub mod admin;
pub mod health;
pub mod login;
pub mod tokens;
