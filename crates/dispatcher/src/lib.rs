pub mod channel;
pub mod channels;
pub mod dispatcher;
pub mod types;

pub use channel::{send_with_retry, Channel};
pub use channels::{EmailChannel, SmtpSettings, TelegramChannel};
pub use dispatcher::Dispatcher;
pub use types::{ChannelError, SendOutcome};
