//! Entity access services

pub mod contact;
pub mod deal;
pub mod entity;
pub mod task;

pub use contact::ContactService;
pub use deal::DealService;
pub use entity::{EntityService, ManagedEntity};
pub use task::TaskService;
