//! Host-side coordination core for an injected ask-bar overlay.
//!
//! The crate injects an interactive overlay surface into a host document,
//! keeps it isolated behind a message-passing protocol, arbitrates when the
//! otherwise click-through surface should accept pointer input, and keeps a
//! single conversation record synchronized between the surface, memory and
//! persistent storage. Rendering, the chat transport and raw key-event
//! decoding stay outside, behind the traits in [`surface`], [`conversation`]
//! and [`coordinator`].

pub mod arbiter;
pub mod bus;
pub mod conversation;
pub mod coordinator;
pub mod keybind;
pub mod logging;
pub mod mention;
pub mod protocol;
pub mod settings;
pub mod store;
pub mod surface;
