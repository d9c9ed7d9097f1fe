pub mod state;

pub use state::{TimerState, DEFAULT_TIMER_SECONDS};
