//! Repositories of the authentication backend

pub mod user;

pub use user::UserRepository;
