use crate::ports::encoder::EncoderRunner;
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs the encoder as a child process and waits for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEncoder;

impl ProcessEncoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EncoderRunner for ProcessEncoder {
    async fn run(&self, argv: &[String]) -> io::Result<Option<i32>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty encoder command"))?;

        debug!(program = %program, args = ?args, "Starting encoder");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                program = %program,
                code = ?output.status.code(),
                stderr = %stderr.trim_end(),
                "Encoder exited unsuccessfully"
            );
        }
        Ok(output.status.code())
    }
}
