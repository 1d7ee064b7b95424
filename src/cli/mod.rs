mod commands;
mod handlers;

pub use commands::{Cli, Commands, InputArgs, RevisionArgs};
pub use handlers::{
    handle_create, handle_delete, handle_diff, handle_generate, handle_get, handle_init, handle_invoke,
    handle_list, handle_promote, handle_sweep, handle_test, handle_traces, handle_update,
    handle_variables, GlobalOptions,
};
