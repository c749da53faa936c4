//! Console logging
//!
//! Inside the canister every line goes to the replica debug log through
//! `ic_cdk::println!`. Native builds (unit tests, tooling) have no replica,
//! so the same lines go to stdout instead.

/// Log a formatted line to the canister console
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        $crate::infrastructure::logging::emit(&format!($($arg)*))
    };
}

pub fn emit(line: &str) {
    #[cfg(target_arch = "wasm32")]
    ic_cdk::println!("{}", line);

    #[cfg(not(target_arch = "wasm32"))]
    println!("{}", line);
}
