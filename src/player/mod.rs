pub mod controller;
pub mod state;

pub use controller::{GateCommand, GateHandle, GateSettings, WatchGateController};
pub use state::{PlaybackState, ProgressEvent, SeekOrigin, SeekRequest, SessionPhase};
