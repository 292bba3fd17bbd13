//! Protocol module containing message shapes and the codec.

pub mod codec;
pub mod messages;

pub use codec::{
    check_select_ack, decode_camera_list, encode_select_request, is_select_ack, parse_beacon,
    ProtocolError,
};
pub use messages::*;
