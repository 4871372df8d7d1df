use std::collections::HashSet;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::events::{GenEvent, Outcome, StopReason};
use crate::generator::Generator;

/// Foreground loop: owns the generator and reports its events in order.
pub struct App {
    pub generator: Generator,
    events: UnboundedReceiver<GenEvent>,
}

impl App {
    pub fn new(generator: Generator, events: UnboundedReceiver<GenEvent>) -> Self {
        Self { generator, events }
    }

    /// Report events until every job in `job_ids` has finished or polling
    /// stopped. Ctrl-C cancels polling for all of them.
    pub async fn watch(&mut self, job_ids: impl IntoIterator<Item = String>) -> anyhow::Result<()> {
        let mut pending: HashSet<String> = job_ids.into_iter().collect();
        let mut interrupted = false;

        while !pending.is_empty() {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        warn!("Event channel closed with {} job(s) outstanding", pending.len());
                        break;
                    };
                    self.on_gen_event(&event);
                    if event.is_final() {
                        pending.remove(event.job_id());
                    }
                }
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    if interrupted {
                        break;
                    }
                    interrupted = true;
                    info!("Interrupted; cancelling polling");
                    for job_id in &pending {
                        self.generator.cancel(job_id).await;
                    }
                }
            }
        }

        Ok(())
    }

    fn on_gen_event(&self, event: &GenEvent) {
        println!("{}", describe(event));
    }
}

pub fn describe(event: &GenEvent) -> String {
    match event {
        GenEvent::StatusChanged {
            job_id,
            status,
            remote_status,
            attempt,
        } => {
            if remote_status == status.as_str() {
                format!("{} {job_id}: {status} (check {attempt})", status.icon())
            } else {
                format!(
                    "{} {job_id}: {status} [{remote_status}] (check {attempt})",
                    status.icon()
                )
            }
        }
        GenEvent::Terminal { job_id, outcome } => {
            let icon = outcome.status().icon();
            match outcome {
                Outcome::Succeeded {
                    video_url,
                    expires_at,
                } => format!(
                    "{icon} {job_id}: done\n   {video_url}\n   available until {}",
                    expires_at.format("%Y-%m-%d %H:%M UTC")
                ),
                Outcome::SucceededWithoutResult => {
                    format!("{icon} {job_id}: done, but the service returned no video URL")
                }
                Outcome::Failed(failure) => format!("{icon} {job_id}: failed\n   {failure}"),
            }
        }
        GenEvent::PollFailed {
            job_id,
            attempt,
            error,
        } => format!("⚠ {job_id}: check {attempt} failed ({error}); still polling"),
        GenEvent::PollingStopped {
            job_id,
            reason,
            last_status,
        } => match reason {
            StopReason::Cancelled => {
                format!("⏹ {job_id}: stopped polling, last seen {last_status}")
            }
            StopReason::Exhausted => format!(
                "⏹ {job_id}: gave up waiting, last seen {last_status}; run `clipforge status {job_id}` later"
            ),
        },
    }
}
