#![warn(missing_docs)]
//! FrameLens Core - Worker Runtime
//!
//! Everything that executes a task, wherever it runs:
//! - `run_task`, the single entry point both execution strategies call
//! - The custom task table (closures plus handlers registered with `inventory`)
//! - `WorkerMain`, the loop hosted inside the isolated context

mod custom;
mod runner;
mod worker;

pub use custom::{CustomHandler, CustomTaskDef, CustomTaskTable};
pub use runner::{elapsed_ms, run_task};
pub use worker::{WorkerMain, shutdown_requested};

inventory::collect!(CustomTaskDef);

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || {
    for _ in inventory::iter::<CustomTaskDef> {}
};
