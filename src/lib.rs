#![warn(clippy::pedantic)]
// Noisy doc/signature lints — would require annotating hundreds of pub functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference — keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Intentional casts throughout scheduling code (timestamps, durations, sizes)
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
// Module structure — our module has foo::FooService pattern by design
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod control;
pub mod delivery;
pub mod detector;
pub mod errors;
pub mod frequency;
pub mod retry;
pub mod state;
pub(crate) mod utils;

pub use control::ControlPlane;
pub use delivery::Sender;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
