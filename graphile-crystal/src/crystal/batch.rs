//! Collects parents that need the same plan into batches and executes them.
//!
//! Resolvers register an entry with the open batch of their plan and wait on
//! the returned [`PendingResult`]. A batch is flushed once the operation it
//! belongs to cannot make progress any more, which is after every resolver
//! that could still join the batch has done so.

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::FutureExt;
use futures::StreamExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use tokio::sync::oneshot;
use tracing::Instrument;

use super::CrystalContext;
use super::CrystalObject;
use super::Plan;
use super::PlanId;
use crate::error::CrystalError;
use crate::json_ext::Value;

pub(crate) const BATCH_SPAN_NAME: &str = "crystal.batch";

type BatchResult = Result<Value, CrystalError>;

/// Identifies the single open batch of a plan within a crystal context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub plan_id: PlanId,
    pub context_id: u64,
}

/// A handle to the batch a field's parents are added to.
#[derive(Clone, Debug)]
pub struct BatchRef {
    key: BatchKey,
    plan: Plan,
    crystal_context: Arc<CrystalContext>,
}

impl BatchRef {
    pub(crate) fn new(plan_id: PlanId, plan: Plan, crystal_context: Arc<CrystalContext>) -> Self {
        Self {
            key: BatchKey {
                plan_id,
                context_id: crystal_context.id(),
            },
            plan,
            crystal_context,
        }
    }

    pub fn key(&self) -> BatchKey {
        self.key
    }

    pub fn plan_id(&self) -> PlanId {
        self.key.plan_id
    }

    pub fn crystal_context(&self) -> &Arc<CrystalContext> {
        &self.crystal_context
    }

    fn open(&self) -> Batch {
        Batch {
            key: self.key,
            plan: self.plan.clone(),
            crystal_context: self.crystal_context.clone(),
            entries: Vec::new(),
        }
    }
}

/// The result of one batch entry; settles once its batch has executed.
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct PendingResult {
    plan_id: PlanId,
    receiver: oneshot::Receiver<BatchResult>,
}

impl Future for PendingResult {
    type Output = BatchResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(CrystalError::BatchDropped {
                    plan_id: this.plan_id.0,
                })
            })
        })
    }
}

#[derive(Debug)]
struct Batch {
    key: BatchKey,
    plan: Plan,
    crystal_context: Arc<CrystalContext>,
    entries: Vec<(CrystalObject, oneshot::Sender<BatchResult>)>,
}

impl Batch {
    /// Splits this batch in chunks of at most `max_batch_size` entries,
    /// keeping entry order.
    fn split(self, max_batch_size: Option<NonZeroUsize>) -> Vec<Batch> {
        let Some(max_batch_size) = max_batch_size.map(NonZeroUsize::get) else {
            return vec![self];
        };
        let Batch {
            key,
            plan,
            crystal_context,
            mut entries,
        } = self;
        let mut chunks = Vec::with_capacity(entries.len().div_ceil(max_batch_size));
        while entries.len() > max_batch_size {
            let rest = entries.split_off(max_batch_size);
            chunks.push(Batch {
                key,
                plan: plan.clone(),
                crystal_context: crystal_context.clone(),
                entries,
            });
            entries = rest;
        }
        chunks.push(Batch {
            key,
            plan,
            crystal_context,
            entries,
        });
        chunks
    }

    async fn execute(self) {
        let Batch {
            key,
            plan,
            crystal_context,
            entries,
        } = self;
        let (parents, senders): (Vec<CrystalObject>, Vec<_>) = entries.into_iter().unzip();
        tracing::trace!(plan = %key.plan_id, parents = ?parents, "executing batch");

        let outcome = plan
            .execute(key.plan_id, &crystal_context, &parents)
            .instrument(tracing::info_span!(
                BATCH_SPAN_NAME,
                "crystal.plan" = key.plan_id.0,
                "crystal.batch.size" = parents.len()
            ))
            .await;
        let error = match outcome {
            Ok(results) if results.len() == senders.len() => {
                for (sender, result) in senders.into_iter().zip(results) {
                    // The receiving resolver may have been cancelled.
                    let _ = sender.send(Ok(result));
                }
                return;
            }
            Ok(results) => CrystalError::BatchSizeMismatch {
                plan_id: key.plan_id.0,
                expected: senders.len(),
                actual: results.len(),
            },
            Err(err) => err,
        };
        failfast_error!("batch of {} entries failed: {}", senders.len(), error);
        for sender in senders {
            let _ = sender.send(Err(error.clone()));
        }
    }
}

/// Owns the open batches of one aether.
#[derive(Debug, Default)]
pub struct BatchScheduler {
    open: Mutex<IndexMap<BatchKey, Batch>>,
    max_batch_size: Option<NonZeroUsize>,
    executions: AtomicUsize,
}

impl BatchScheduler {
    pub fn new(max_batch_size: Option<NonZeroUsize>) -> Self {
        Self {
            max_batch_size,
            ..Default::default()
        }
    }

    /// Makes sure a batch is open for `batch`'s plan and context.
    pub(crate) fn open(&self, batch: &BatchRef) {
        self.open
            .lock()
            .entry(batch.key)
            .or_insert_with(|| batch.open());
    }

    /// Adds `parent` to the open batch; its result is delivered in order.
    pub fn register_entry(&self, batch: &BatchRef, parent: CrystalObject) -> PendingResult {
        let (sender, receiver) = oneshot::channel();
        self.open
            .lock()
            .entry(batch.key)
            .or_insert_with(|| batch.open())
            .entries
            .push((parent, sender));
        PendingResult {
            plan_id: batch.key.plan_id,
            receiver,
        }
    }

    /// Whether any batch is waiting to be flushed.
    pub fn has_open_batches(&self) -> bool {
        self.open
            .lock()
            .values()
            .any(|batch| !batch.entries.is_empty())
    }

    /// The number of plan executions performed so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    fn take_open_batches(&self) -> Vec<Batch> {
        let open = std::mem::take(&mut *self.open.lock());
        let batches: Vec<Batch> = open
            .into_values()
            .filter(|batch| !batch.entries.is_empty())
            .flat_map(|batch| batch.split(self.max_batch_size))
            .collect();
        self.executions.fetch_add(batches.len(), Ordering::Relaxed);
        batches
    }

    /// Runs `operation`, flushing batches whenever it stalls on them.
    pub fn drive<F: Future>(&self, operation: F) -> Drive<'_, F> {
        Drive {
            scheduler: self,
            operation,
            in_flight: FuturesUnordered::new(),
        }
    }
}

pin_project! {
    /// Future returned by [`BatchScheduler::drive`].
    #[must_use = "futures do nothing unless polled"]
    pub struct Drive<'a, F> {
        scheduler: &'a BatchScheduler,
        #[pin]
        operation: F,
        in_flight: FuturesUnordered<BoxFuture<'static, ()>>,
    }
}

impl<F: Future> Future for Drive<'_, F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            if let Poll::Ready(output) = this.operation.as_mut().poll(cx) {
                return Poll::Ready(output);
            }

            let batches = this.scheduler.take_open_batches();
            let flushed = !batches.is_empty();
            for batch in batches {
                this.in_flight.push(batch.execute().boxed());
            }

            let mut settled = false;
            while let Poll::Ready(Some(())) = this.in_flight.poll_next_unpin(cx) {
                settled = true;
            }

            if !flushed && !settled {
                return Poll::Pending;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::join_all;
    use serde_json::json;

    use super::*;
    use crate::crystal::uid;
    use crate::crystal::LambdaPlan;
    use crate::crystal::PathIdentity;

    fn batch_ref(plan: Plan, context: &Arc<CrystalContext>) -> BatchRef {
        BatchRef::new(PlanId(0), plan, context.clone())
    }

    fn parents(context: &CrystalContext, count: usize) -> Vec<CrystalObject> {
        (0..count)
            .map(|index| {
                context.new_crystal_object(
                    Some(PlanId(0)),
                    PathIdentity::from("~>Query.users"),
                    uid("users"),
                    vec![index],
                    Arc::new(json!({ "n": index })),
                    None,
                )
            })
            .collect()
    }

    fn doubling() -> Plan {
        Plan::executable(LambdaPlan::map("double", |value| {
            Ok(json!(value["n"].as_u64().unwrap_or_default() * 2))
        }))
    }

    #[tokio::test]
    async fn entries_settle_in_order() {
        let context = Arc::new(CrystalContext::new(Arc::new(json!({})), false));
        let scheduler = BatchScheduler::default();
        let batch = batch_ref(doubling(), &context);

        let pending: Vec<_> = parents(&context, 5)
            .into_iter()
            .map(|parent| scheduler.register_entry(&batch, parent))
            .collect();
        assert!(scheduler.has_open_batches());

        let results = scheduler.drive(join_all(pending)).await;
        assert_eq!(
            results.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
            vec![json!(0), json!(2), json!(4), json!(6), json!(8)]
        );
        assert_eq!(scheduler.executions(), 1);
        assert!(!scheduler.has_open_batches());
    }

    #[tokio::test]
    async fn max_batch_size_chunks_entries() {
        let context = Arc::new(CrystalContext::new(Arc::new(json!({})), false));
        let scheduler = BatchScheduler::new(NonZeroUsize::new(2));
        let batch = batch_ref(doubling(), &context);

        let pending: Vec<_> = parents(&context, 5)
            .into_iter()
            .map(|parent| scheduler.register_entry(&batch, parent))
            .collect();
        let results = scheduler.drive(join_all(pending)).await;
        assert_eq!(results[4].as_ref().unwrap(), &json!(8));
        assert_eq!(scheduler.executions(), 3);
    }

    #[tokio::test]
    async fn failure_reaches_every_entry() {
        let context = Arc::new(CrystalContext::new(Arc::new(json!({})), false));
        let scheduler = BatchScheduler::default();
        let batch = batch_ref(
            Plan::executable(LambdaPlan::new("broken", |_, _| Err("db is down".into()))),
            &context,
        );

        let pending: Vec<_> = parents(&context, 3)
            .into_iter()
            .map(|parent| scheduler.register_entry(&batch, parent))
            .collect();
        let results = scheduler.drive(join_all(pending)).await;
        for result in results {
            assert_eq!(
                result.unwrap_err(),
                CrystalError::PlanFailed {
                    plan_id: 0,
                    reason: "db is down".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn wrong_result_count_is_an_error() {
        let context = Arc::new(CrystalContext::new(Arc::new(json!({})), false));
        let scheduler = BatchScheduler::default();
        let batch = batch_ref(
            Plan::executable(LambdaPlan::new("short", |_, _| Ok(vec![json!(1)]))),
            &context,
        );

        let pending: Vec<_> = parents(&context, 2)
            .into_iter()
            .map(|parent| scheduler.register_entry(&batch, parent))
            .collect();
        let results = scheduler.drive(join_all(pending)).await;
        assert_eq!(
            results[1].clone().unwrap_err(),
            CrystalError::BatchSizeMismatch {
                plan_id: 0,
                expected: 2,
                actual: 1
            }
        );
    }

    #[tokio::test]
    async fn dropped_batch_is_reported() {
        let context = Arc::new(CrystalContext::new(Arc::new(json!({})), false));
        let scheduler = BatchScheduler::default();
        let batch = batch_ref(doubling(), &context);
        let parent = parents(&context, 1).remove(0);

        let pending = scheduler.register_entry(&batch, parent);
        drop(scheduler);
        assert_eq!(
            pending.await.unwrap_err(),
            CrystalError::BatchDropped { plan_id: 0 }
        );
    }

    #[tokio::test]
    async fn entries_registered_after_a_flush_get_a_new_batch() {
        let context = Arc::new(CrystalContext::new(Arc::new(json!({})), false));
        let scheduler = BatchScheduler::default();
        let batch = batch_ref(doubling(), &context);
        let mut parents = parents(&context, 2).into_iter();
        let first = parents.next().unwrap();
        let second = parents.next().unwrap();

        let results = scheduler
            .drive(async {
                let a = scheduler.register_entry(&batch, first).await.unwrap();
                let b = scheduler.register_entry(&batch, second).await.unwrap();
                (a, b)
            })
            .await;
        assert_eq!(results, (json!(0), json!(2)));
        assert_eq!(scheduler.executions(), 2);
    }
}
