pub mod delete;
pub mod get;
pub mod upload;

pub use delete::handle_delete;
pub use get::handle_get;
pub use upload::handle_upload;
