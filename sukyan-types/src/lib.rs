//! The scan core's data model (spec §3): history records, WebSocket
//! connections/messages, insertion points, payload generators, detection
//! methods, issues, and the scan record itself.

pub mod detection;
pub mod generator;
pub mod history;
pub mod insertion;
pub mod issue;
pub mod scan;
pub mod websocket;

pub use detection::*;
pub use generator::*;
pub use history::*;
pub use insertion::*;
pub use issue::*;
pub use scan::*;
pub use websocket::*;
