use super::*;

pub struct Thread {
    ctrl_actor: Actor<Control>,
}

impl Thread {
    async fn run_once(&self) -> Result<()> {
        let expired = self.ctrl_actor.read().await.election_timeout_expired();
        if expired {
            info!("election timeout. try to become a leader");
            control::effect::try_promote::Effect {
                ctrl_actor: &self.ctrl_actor,
            }
            .exec()
            .await?;
        }
        Ok(())
    }

    fn run_loop(self, tick: Duration) -> ThreadHandle {
        let fut = async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                if let Err(e) = self.run_once().await {
                    debug!("election failed: {e:#}");
                }
            }
        };
        let hdl = tokio::spawn(fut).abort_handle();
        ThreadHandle(hdl)
    }
}

pub fn run(ctrl_actor: Actor<Control>, config: &RaftConfig) -> ThreadHandle {
    // Checked often enough to keep the randomized timeouts apart.
    let tick = Duration::max(config.election_timeout_min / 10, Duration::from_millis(1));
    Thread { ctrl_actor }.run_loop(tick)
}
