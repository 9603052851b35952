use super::*;

pub struct Thread {
    ctrl_actor: Weak<RwLock<Control>>,
    follower: Endpoint,
    consumer: EventConsumer<QueueEvent>,
}

impl Thread {
    /// Send one append request to the follower.
    /// Returns true if more entries should be sent right away.
    async fn advance_once(&self, ctrl_actor: &Actor<Control>) -> Result<bool> {
        let (req, conn) = {
            let ctrl = ctrl_actor.read().await;
            if !ctrl.is_leader() {
                return Ok(false);
            }
            let Some(req) = ctrl.prepare_append_request(&self.follower)? else {
                return Ok(false);
            };
            (req, ctrl.io.connect(&self.follower))
        };

        let resp = conn.send_append(req.clone()).await;

        control::effect::advance_replication::Effect {
            ctrl: &mut *ctrl_actor.write().await,
        }
        .exec(&self.follower, &req, resp)
        .await
    }

    fn do_loop(self, heartbeat_interval: Duration) -> ThreadHandle {
        let fut = async move {
            loop {
                // The process is gone.
                let Some(ctrl_actor) = self.ctrl_actor.upgrade() else {
                    break;
                };
                let more = match self.advance_once(&ctrl_actor).await {
                    Ok(more) => more,
                    Err(e) => {
                        warn!("replication to {} failed: {e:#}", self.follower);
                        false
                    }
                };
                drop(ctrl_actor);
                // An empty request is sent as heartbeat if nothing is appended in the interval.
                if !more {
                    self.consumer.consume_events(heartbeat_interval).await;
                }
            }
        };
        let hdl = tokio::spawn(fut).abort_handle();
        ThreadHandle(hdl)
    }
}

pub fn run(
    ctrl_actor: Weak<RwLock<Control>>,
    follower: Endpoint,
    consumer: EventConsumer<QueueEvent>,
    heartbeat_interval: Duration,
) -> ThreadHandle {
    Thread {
        ctrl_actor,
        follower,
        consumer,
    }
    .do_loop(heartbeat_interval)
}
