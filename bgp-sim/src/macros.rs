/// Tracing macros that automatically include a `proto="bgp-sim"` field plus
/// the emitting router's AS number as `router=`. The first argument is
/// always the AS number.

/// Log an info-level message with proto="bgp-sim" and router=<as_number>
#[macro_export]
macro_rules! sim_info {
    ($router:expr, $($arg:tt)*) => {
        tracing::info!(proto = "bgp-sim", router = $router, $($arg)*)
    };
}

/// Log a warning-level message with proto="bgp-sim" and router=<as_number>
#[macro_export]
macro_rules! sim_warn {
    ($router:expr, $($arg:tt)*) => {
        tracing::warn!(proto = "bgp-sim", router = $router, $($arg)*)
    };
}

/// Log an error-level message with proto="bgp-sim" and router=<as_number>
#[macro_export]
macro_rules! sim_error {
    ($router:expr, $($arg:tt)*) => {
        tracing::error!(proto = "bgp-sim", router = $router, $($arg)*)
    };
}

/// Log a debug-level message with proto="bgp-sim" and router=<as_number>
#[macro_export]
macro_rules! sim_debug {
    ($router:expr, $($arg:tt)*) => {
        tracing::debug!(proto = "bgp-sim", router = $router, $($arg)*)
    };
}
