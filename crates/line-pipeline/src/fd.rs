//! Line source over the already-open read end of an OS pipe inherited by the
//! child process. Immediately ready; close releases the descriptor.

use std::os::fd::OwnedFd;
use std::sync::Arc;

use async_trait::async_trait;

use crate::LineSourceError;
use crate::pipe::PipeReader;
use crate::pipeline::Pipeline;
use crate::source::{LineSource, ReadySignal, SourceStats};

pub struct FdReader {
    inner: PipeReader,
}

impl FdReader {
    /// Adopt `fd` as a line source. The descriptor is owned from here on and
    /// released when the reader finishes or is dropped.
    pub fn from_owned_fd(fd: OwnedFd, pipeline: Arc<Pipeline>) -> Self {
        let file = tokio::fs::File::from_std(std::fs::File::from(fd));
        Self {
            inner: PipeReader::new(file, pipeline),
        }
    }
}

#[async_trait]
impl LineSource for FdReader {
    async fn run(&mut self) -> Result<(), LineSourceError> {
        self.inner.run().await
    }

    fn ready(&self) -> ReadySignal {
        self.inner.ready()
    }

    fn close(&self) {
        self.inner.close();
    }

    fn stats(&self) -> SourceStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use std::io::Write;

    #[tokio::test]
    async fn reads_lines_from_an_inherited_pipe_fd() {
        let (reader, mut writer) = std::io::pipe().unwrap();
        let pipeline = Arc::new(Pipeline::new(PipelineConfig::default()));
        let mut source = FdReader::from_owned_fd(reader.into(), pipeline.clone());
        assert!(source.ready().is_ready());

        let feeder = std::thread::spawn(move || {
            writer.write_all(b"first\nsecond\n").unwrap();
            // Dropping the writer delivers EOF to the reader.
        });

        source.run().await.unwrap();
        feeder.join().unwrap();

        let stats = source.stats();
        assert_eq!(stats.lines_read, 2);
        assert!(stats.healthy);
        assert_eq!(pipeline.stats().read, 2);
    }
}
