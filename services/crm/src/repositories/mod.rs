//! Repositories over the backend data service

pub mod activity;
pub mod profile;

pub use activity::ActivityRepository;
pub use profile::ProfileRepository;
