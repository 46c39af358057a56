pub mod bucket;
pub mod list;
pub mod secret;
