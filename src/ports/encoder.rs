use async_trait::async_trait;

/// Runs the external encoder binary.
///
/// `argv[0]` is the executable path, the rest are its arguments. The returned
/// value is the process exit code, `None` when the process was terminated by a
/// signal. Stderr is not inspected.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncoderRunner: Send + Sync {
    async fn run(&self, argv: &[String]) -> std::io::Result<Option<i32>>;
}
