mod forwarder;

pub use forwarder::*;
