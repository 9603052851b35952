use super::*;

struct Thread<F> {
    controller: Arc<SnapshotController>,
    interval: Duration,
    processed_position: F,
}

impl<F> Thread<F>
where
    F: Fn() -> Position + Send + Sync + 'static,
{
    async fn run_once(&self) -> Result<()> {
        let commit_position = self.controller.log().commit_position();
        let position = Position::min((self.processed_position)(), commit_position);
        if position > self.controller.latest_position() {
            self.controller.take_snapshot(position).await?;
        }
        Ok(())
    }

    fn do_loop(self) -> ThreadHandle {
        let fut = async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.run_once().await {
                    error!("failed to take snapshot: {e:#}");
                }
            }
        };
        let hdl = tokio::spawn(fut).abort_handle();
        ThreadHandle(hdl)
    }
}

/// Periodically snapshot the state up to `processed_position()`, bounded by the commit position.
pub fn run(
    controller: Arc<SnapshotController>,
    interval: Duration,
    processed_position: impl Fn() -> Position + Send + Sync + 'static,
) -> ThreadHandle {
    Thread {
        controller,
        interval,
        processed_position,
    }
    .do_loop()
}
