pub mod logger;

pub use self::logger::{LogSink, init as init_logger};
