pub mod format;
pub mod notifier;
pub mod telegram;

pub use format::format_delay_message;
pub use notifier::{DelayNotifier, DeliveryMode, NotifierSettings, NotifyReport};
pub use telegram::{NotifyError, TelegramClient, TelegramConfig};
