//! Pipeline scenario tests driving the engine with a scripted peer.

mod helpers;
