// Key prefixes used in the local key-value store
pub const PENDING_ACK_PFX: &str = "pending_ack";
