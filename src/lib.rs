//! Parity digit-signal engine for the Deriv websocket API.
//!
//! A feed session streams ticks; uniform-parity quotes become DIGITEVEN /
//! DIGITODD plans that run on the demo or real account with an optional
//! gale ladder. See `deriv::coordinator` for the lifecycle.

pub mod deriv;

pub use deriv::config::{Credentials, EngineSettings, TradingConfig};
pub use deriv::coordinator::{Engine, EngineHandle};
pub use deriv::error::{DerivError, Result};
pub use deriv::messages::UiEvent;
