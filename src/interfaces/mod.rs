pub mod forwarders;
mod log_forwarder;

pub use forwarders::{
    ConnectivityForwarder, ForwardMessage, ForwardReply, Forwarders, NoticeForwarder,
    RequestForwarder, StreamForwarder,
};
pub use log_forwarder::LogForwarder;
