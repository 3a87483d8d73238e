//! Line source over a readable byte stream of unknown origin, typically a
//! subprocess stdio handle. Immediately ready; EOF terminates.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::pipeline::Pipeline;
use crate::source::{
    LineSource, ReadyFlag, ReadySignal, SourceCounters, SourceStats, scan_into_pipeline,
};
use crate::LineSourceError;

pub struct PipeReader {
    reader: Option<Box<dyn AsyncRead + Send + Unpin>>,
    pipeline: Arc<Pipeline>,
    counters: Arc<SourceCounters>,
    ready: ReadySignal,
    token: CancellationToken,
}

impl PipeReader {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        pipeline: Arc<Pipeline>,
    ) -> Self {
        let (flag, ready) = ReadyFlag::new();
        flag.mark_ready();
        Self {
            reader: Some(Box::new(reader)),
            pipeline,
            counters: SourceCounters::new(),
            ready,
            token: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl LineSource for PipeReader {
    async fn run(&mut self) -> Result<(), LineSourceError> {
        let Some(reader) = self.reader.take() else {
            debug!("pipe reader already ran");
            return Ok(());
        };
        let result = scan_into_pipeline(reader, &self.pipeline, &self.counters, &self.token).await;
        self.pipeline.close_channel();
        if let Err(e) = result {
            self.counters
                .failed
                .store(true, std::sync::atomic::Ordering::Relaxed);
            return Err(e.into());
        }
        Ok(())
    }

    fn ready(&self) -> ReadySignal {
        self.ready.clone()
    }

    fn close(&self) {
        self.token.cancel();
    }

    fn stats(&self) -> SourceStats {
        self.counters.stats()
    }
}
