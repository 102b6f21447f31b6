#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Tap error: {0}")]
    TapError(#[from] tidy_tuntap::error::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArg(&'static str),

    #[error("Module: {0} does not exist")]
    NoSuchModule(u32),

    #[error("Port: {0} does not exist")]
    NoSuchPort(u32),

    #[error("Table: {0} does not exist")]
    NoSuchTable(u32),

    #[error("Table: {0} is selected and cannot be freed")]
    TableInUse(u32),

    #[error("Send queue full on port: {0}")]
    QueueFull(u32),

    #[error("Frame too short: {0} bytes")]
    ShortFrame(usize),

    #[error("Message too long: {0} bytes")]
    OversizeMessage(usize),
}
