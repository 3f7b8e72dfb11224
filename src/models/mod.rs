pub mod notification;
pub mod token;
pub mod user;

pub use notification::{NotificationCommand, UserWelcomeData, USER_WELCOME_TEMPLATE};
pub use token::{
    generate_activation_token, hash_plaintext, GeneratedToken, Token, TokenError, TokenScope,
    TOKEN_BYTES_LENGTH, TOKEN_PLAINTEXT_LENGTH,
};
pub use user::{NewUser, User};
