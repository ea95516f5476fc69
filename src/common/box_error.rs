//! error type shared by every fallible control-side call in the engine.
//!
//! Anything that implements `Error + Send + Sync` converts into it with `?`, so
//! driver, session and plugin host implementations can surface their own errors
//! without the engine knowing their concrete types.
pub type BoxError = std::boxed::Box<
    dyn std::error::Error // must implement Error to satisfy ?
        + std::marker::Send // errors cross from worker threads
        + std::marker::Sync, // needed for threads
>;
