//! Application layer: bookmark tracking, stores, navigation, and the session context.

pub mod navigation;
pub mod paths;
pub mod session;
pub mod sticky;
pub mod store;
