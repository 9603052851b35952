use super::*;

pub struct Thread {
    ctrl_actor: Actor<Control>,
    consumer: EventConsumer<ReplicationEvent>,
}

impl Thread {
    async fn run_once(&self) -> Result<()> {
        if !self.ctrl_actor.read().await.is_leader() {
            return Ok(());
        }
        control::effect::advance_commit::Effect {
            ctrl: &mut *self.ctrl_actor.write().await,
        }
        .exec()
        .await
    }

    fn do_loop(self, timeout: Duration) -> ThreadHandle {
        let fut = async move {
            loop {
                self.consumer.consume_events(timeout).await;
                if let Err(e) = self.run_once().await {
                    warn!("failed to advance commit position: {e:#}");
                }
            }
        };
        let hdl = tokio::spawn(fut).abort_handle();
        ThreadHandle(hdl)
    }
}

pub fn run(
    ctrl_actor: Actor<Control>,
    consumer: EventConsumer<ReplicationEvent>,
    config: &RaftConfig,
) -> ThreadHandle {
    Thread {
        ctrl_actor,
        consumer,
    }
    .do_loop(config.heartbeat_interval)
}
