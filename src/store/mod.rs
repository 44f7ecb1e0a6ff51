//! `SQLite` persistence for thread→session bindings.

pub mod bindings;
pub mod db;

pub use bindings::{Binding, BindingStore};
