//! CLI command handlers. Each command is in its own file for clarity.

mod add;
mod cancel;
mod pause;
mod queue;
mod remove;
mod resume;
mod retry;
mod serve;
mod status;

pub use add::run_add;
pub use cancel::run_cancel;
pub use pause::run_pause;
pub use queue::{
    run_queue_create, run_queue_delete, run_queue_disable, run_queue_enable, run_queue_list,
    run_queue_move, run_queue_set_max, run_queue_set_schedule,
};
pub use remove::run_remove;
pub use resume::run_resume;
pub use retry::run_retry;
pub use serve::run_serve;
pub use status::run_status;
