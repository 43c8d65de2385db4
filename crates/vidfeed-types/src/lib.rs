pub mod api;
pub mod cursor;
pub mod events;
pub mod models;
pub mod page;
