use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("failed to spawn dashboard binary {}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
