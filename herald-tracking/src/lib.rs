//! Message preparation for outbound campaign email.
//!
//! Everything in this crate is pure text rewriting: encoding the attribution
//! token, stamping bodies with open/click tracking, and substituting template
//! placeholders. No I/O, no state.

pub mod inject;
pub mod template;
pub mod token;

pub use inject::{TrackingConfig, inject_tracking};
pub use template::render_template;
pub use token::TrackingToken;
