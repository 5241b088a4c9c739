use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};

use super::refresh::SchedulerInner;

/// Upper bound on concurrently executing refresh jobs. Staggering decides
/// when a job becomes eligible; this bounds how many run at once.
const MAX_CONCURRENT_JOBS: usize = 4;

/// Fallback wakeup when nothing is queued or every execution slot is taken.
const IDLE_POLL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub(crate) enum QueueMessage {
    Schedule(ScheduledJob),
    Shutdown,
}

/// Work the queue knows how to run, tagged with its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Job {
    RefreshItem { item_id: i64 },
}

/// A job plus the instant it becomes eligible to run. The sequence number
/// keeps the run order stable for jobs scheduled at the same instant.
#[derive(Debug)]
pub(crate) struct ScheduledJob {
    pub run_at: Instant,
    pub seq: u64,
    pub job: Job,
}

impl PartialEq for ScheduledJob {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ScheduledJob {}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.run_at
            .cmp(&other.run_at)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Worker loop. Holds every scheduled job in a run-at ordered heap and moves
/// due jobs into a bounded set of executing futures. A job that errors is
/// contained by `SchedulerInner::execute`; it never unwinds into this loop.
///
/// Shutdown (or all senders dropping) discards the not-yet-executed heap,
/// which is how teardown cancels pending jobs. Jobs already executing are
/// allowed to finish.
pub(crate) async fn run(inner: Arc<SchedulerInner>, mut rx: mpsc::UnboundedReceiver<QueueMessage>) {
    let mut queue: BinaryHeap<Reverse<ScheduledJob>> = BinaryHeap::new();
    let mut in_flight: FuturesUnordered<BoxFuture<'static, ()>> = FuturesUnordered::new();

    loop {
        // Promote jobs whose run-at time has arrived into execution.
        let now = Instant::now();
        while in_flight.len() < MAX_CONCURRENT_JOBS {
            match queue.peek() {
                Some(Reverse(job)) if job.run_at <= now => {
                    if let Some(Reverse(job)) = queue.pop() {
                        let inner = Arc::clone(&inner);
                        in_flight.push(Box::pin(async move {
                            match job.job {
                                Job::RefreshItem { item_id } => inner.execute(item_id).await,
                            }
                        }));
                    }
                }
                _ => break,
            }
        }

        // Only wake for the next due job while an execution slot is free;
        // otherwise wait for a completion or a new message.
        let next_due = if in_flight.len() < MAX_CONCURRENT_JOBS {
            queue
                .peek()
                .map(|Reverse(job)| job.run_at)
                .unwrap_or(now + IDLE_POLL)
        } else {
            now + IDLE_POLL
        };

        tokio::select! {
            msg = rx.recv() => match msg {
                Some(QueueMessage::Schedule(job)) => queue.push(Reverse(job)),
                Some(QueueMessage::Shutdown) | None => break,
            },
            _ = sleep_until(next_due) => {}
            Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
        }
    }

    // Drain jobs that already started; everything still queued is dropped.
    while in_flight.next().await.is_some() {}
}
