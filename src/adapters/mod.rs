//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter       | Implements              | Connects to              |
//! |---------------|-------------------------|--------------------------|
//! | `loopback`    | LinkProvider, GattLink  | In-memory peripheral     |
//! | `console_log` | tracing-subscriber fmt  | Stderr                   |

pub mod console_log;
pub mod loopback;
