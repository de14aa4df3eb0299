// ledstrip - Asynchronous animation controller for addressable LED strips
// Turns a blocking strip driver into a cancellable, serialized async service

pub mod animation;
mod bus;
pub mod config;
pub mod control;
pub mod controller;
pub mod error;
pub mod frame;
pub mod mock;
pub mod status;

pub use animation::{wheel, Animation, Frames};
pub use config::{build_led_control, Backend, ConfigError, LedConfig};
pub use control::{AnimationHandle, ControllerState, LedControl, Outcome, TaskStatus};
pub use controller::{ControllerOptions, LedController};
pub use error::{frame_delay_from_millis, LedError, MAX_FRAME_DELAY};
pub use frame::{apply_power_budget, FrameBuffer};
pub use mock::MockLedController;
pub use status::{IndicatorState, StatusEffect, StatusIndicator, StatusPalette};

pub use ledstrip_driver::{DriverError, Rgb, StripDriver};
