//! Canonical roster state with role integrity and change observers, plus
//! the list controller that editor screens are built on.

pub mod compose;
pub mod error;
pub mod list_controller;
pub mod store;

pub use compose::{compose, ComposedEmail};
pub use error::{ListError, PersistFailure, StoreError};
pub use list_controller::ListController;
pub use store::{AppStore, Collections, Managed, Observer};
