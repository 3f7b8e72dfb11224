pub mod auth_handlers;

pub use auth_handlers::{activate_handler, register_handler, resend_activation_token_handler};
