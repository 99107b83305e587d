//! Load progress display for the CLI.
//!
//! With the `progress` feature off, the same names resolve to inert types
//! covering just the calls `hfr open` makes.

#[cfg(feature = "progress")]
pub use indicatif::{ProgressBar, ProgressStyle};

#[cfg(not(feature = "progress"))]
pub use self::inert::{ProgressBar, ProgressStyle};

#[cfg(not(feature = "progress"))]
mod inert {
    use std::borrow::Cow;
    use std::convert::Infallible;
    use std::time::Duration;

    #[derive(Clone)]
    pub struct ProgressBar;

    impl ProgressBar {
        pub fn new(_permille_total: u64) -> Self {
            ProgressBar
        }

        pub fn set_style(&self, _style: ProgressStyle) {}
        pub fn set_message(&self, _rows: impl Into<Cow<'static, str>>) {}
        pub fn set_position(&self, _permille: u64) {}
        pub fn enable_steady_tick(&self, _every: Duration) {}
        pub fn finish_and_clear(&self) {}
    }

    pub struct ProgressStyle;

    impl ProgressStyle {
        pub fn default_bar() -> Self {
            ProgressStyle
        }

        pub fn template(self, _template: &str) -> Result<Self, Infallible> {
            Ok(self)
        }

        pub fn progress_chars(self, _chars: &str) -> Self {
            self
        }
    }
}
