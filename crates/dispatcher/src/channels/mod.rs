pub mod email;
pub mod telegram;

pub use email::{EmailChannel, SmtpSettings};
pub use telegram::TelegramChannel;
