mod config;
mod source;

pub use self::config::Config;
pub use self::source::SourceConfig;
