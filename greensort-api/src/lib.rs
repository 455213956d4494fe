pub mod close;
pub mod rest;
pub mod websocket;

pub use close::{CloseKind, CLOSE_NORMAL, CLOSE_TRY_AGAIN_LATER};
pub use rest::*;
pub use websocket::{
    BestPayload, ClientMessage, DebugPayload, DetectionPayload, MetadataPayload, ResultPayload,
    ServerMessage,
};
