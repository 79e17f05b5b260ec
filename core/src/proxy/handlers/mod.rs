pub mod forward;
pub mod websocket;

pub use forward::forward_http;
pub use websocket::forward_websocket;
