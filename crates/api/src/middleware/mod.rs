/// Error-to-response mapping shared by all handlers
pub mod error_handling;
