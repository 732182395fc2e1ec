mod command;
mod publisher;

pub use command::*;
pub use publisher::*;

#[cfg(test)]
pub(crate) use publisher::tests::RecordingSink;
