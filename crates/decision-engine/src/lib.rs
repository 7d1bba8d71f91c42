//! MarketSense decision engine
//!
//! Wires the indicator, trap, scoring and probability stages into one
//! pipeline and fuses their outputs into a BUY / SELL / WAIT / DO NOT TRADE
//! [`analysis_core::Decision`].

pub mod config;
pub mod engine;
pub mod fuser;


pub use config::{EngineConfig, ModelConfig};
pub use engine::{Analysis, RetrainReceiver, SignalEngine, TradeClosure};
pub use fuser::{fuse, DecisionThresholds};
