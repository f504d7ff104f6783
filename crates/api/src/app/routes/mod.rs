pub mod admin;
pub mod session;
pub mod system;
pub mod users;
