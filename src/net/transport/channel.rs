//! renet channel layout shared by both UDP endpoints

use std::time::Duration;

use renet::{ChannelConfig, ConnectionConfig, SendType};

use crate::protocol::Delivery;

/// Approve, reject and goodbye frames
pub const CONTROL: u8 = 0;
pub const RELIABLE_ORDERED: u8 = 1;
pub const RELIABLE_UNORDERED: u8 = 2;
/// Unreliable, with a sequence prefix so receivers keep only the newest
pub const SEQUENCED: u8 = 3;

/// Channels carrying session payloads, in drain order
pub const DATA_CHANNELS: [u8; 3] = [RELIABLE_ORDERED, RELIABLE_UNORDERED, SEQUENCED];

/// Per-channel send and receive buffer cap
const CHANNEL_MEMORY_BYTES: usize = 5 * 1024 * 1024;

/// Bytes renet may put on the wire per connection and update
const BYTES_PER_TICK: u64 = 60_000;

pub fn channel_of(delivery: Delivery) -> u8 {
    match delivery {
        Delivery::UnreliableSequenced => SEQUENCED,
        Delivery::ReliableOrdered => RELIABLE_ORDERED,
        Delivery::ReliableUnordered => RELIABLE_UNORDERED,
    }
}

/// Same layout in both directions. Reliable channels resend after `resend_time`.
pub fn connection_config(resend_time: Duration) -> ConnectionConfig {
    let channels = vec![
        ChannelConfig {
            channel_id: CONTROL,
            max_memory_usage_bytes: CHANNEL_MEMORY_BYTES,
            send_type: SendType::ReliableOrdered { resend_time },
        },
        ChannelConfig {
            channel_id: RELIABLE_ORDERED,
            max_memory_usage_bytes: CHANNEL_MEMORY_BYTES,
            send_type: SendType::ReliableOrdered { resend_time },
        },
        ChannelConfig {
            channel_id: RELIABLE_UNORDERED,
            max_memory_usage_bytes: CHANNEL_MEMORY_BYTES,
            send_type: SendType::ReliableUnordered { resend_time },
        },
        ChannelConfig {
            channel_id: SEQUENCED,
            max_memory_usage_bytes: CHANNEL_MEMORY_BYTES,
            send_type: SendType::Unreliable,
        },
    ];

    ConnectionConfig {
        available_bytes_per_tick: BYTES_PER_TICK,
        server_channels_config: channels.clone(),
        client_channels_config: channels,
    }
}
