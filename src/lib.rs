//! Zonewatch Library
//!
//! Zone-intrusion surveillance: forbidden polygons drawn over video sources,
//! continuous and on-demand person detection against them, and range-aware
//! video serving.
//!
//! ## Architecture (7 Components)
//!
//! 1. GeofenceStore - Polygon sets per video (memory / file / MySQL)
//! 2. Geofence evaluator - Point-in-polygon containment
//! 3. DetectionAdapter - Detector boundary, subject filtering
//! 4. AlertSink - Alert frame + record persistence, episode latch
//! 5. StreamMonitor - Per-video sampling state machine
//! 6. MonitorSupervisor - Discovery and ownership of monitor tasks
//! 7. RangeMediaServer - HTTP byte-range video serving
//!
//! WebAPI wires them behind the HTTP surface.

pub mod alert_sink;
pub mod detection_adapter;
pub mod error;
pub mod geofence;
pub mod geofence_store;
pub mod media_server;
pub mod models;
pub mod monitor_supervisor;
pub mod state;
pub mod stream_monitor;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
