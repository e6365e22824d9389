pub use self::parser::{LogFormat, LoggingConfig, MessageOptions, NetworkConfig, Settings};
pub use self::validator::{ConfigError, PreparedMessage, ValidatedSettings};

mod parser;
mod validator;
